use std::path::Path;

use crate::{
    error::LaunchError,
    modules::{MpiModule, MpiStack},
    plan::LaunchPlan,
};

mod mpich2;
mod mvapich2;
mod openmpi;

pub use mpich2::Mpich2;
pub use mvapich2::Mvapich2;
pub use openmpi::OpenMpi;

/// Launcher switches and environment for one plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendering {
    pub args: Vec<String>,
    /// Applied only where the ambient environment leaves the key unset
    pub env: Vec<(String, String)>,
}

impl Rendering {
    fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn env(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

/// The argument and environment conventions of one MPI implementation.
pub trait LauncherProfile {
    fn executable(&self) -> &'static str;
    fn render(&self, plan: &LaunchPlan, nodefile: &Path) -> Result<Rendering, LaunchError>;
}

/// Overrides every stack receives.
fn common_env(rendering: &mut Rendering, plan: &LaunchPlan) {
    rendering.env("OMP_NUM_THREADS", plan.geometry.threads_per_rank);
}

impl MpiModule {
    pub fn profile(&self) -> Box<dyn LauncherProfile> {
        match self.stack {
            MpiStack::Mvapich2 => Box::new(Mvapich2),
            MpiStack::OpenMpi => Box::new(OpenMpi::new(self.version.clone())),
            MpiStack::Mpich2 => Box::new(Mpich2),
        }
    }
}
