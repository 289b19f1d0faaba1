use std::path::Path;

use super::{LauncherProfile, Rendering};
use crate::{error::LaunchError, modules::MpiStack, plan::LaunchPlan};

/// MPICH2 is recognised but cannot be launched yet.
pub struct Mpich2;

impl LauncherProfile for Mpich2 {
    fn executable(&self) -> &'static str {
        "mpiexec"
    }

    fn render(&self, _plan: &LaunchPlan, _nodefile: &Path) -> Result<Rendering, LaunchError> {
        Err(LaunchError::UnsupportedStack(MpiStack::Mpich2.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{
        binding::{BindLevel, BindPolicy},
        launcher::test::{nodefile, plan},
    };

    #[test]
    fn test_unsupported() {
        let p = plan(2, 1, BindPolicy::Scatter, BindLevel::Core);
        assert!(matches!(
            Mpich2.render(&p, &nodefile()),
            Err(LaunchError::UnsupportedStack(s)) if s == "mpich2"
        ));
    }
}
