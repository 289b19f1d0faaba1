use std::path::Path;

use super::{LauncherProfile, Rendering, common_env};
use crate::{
    binding::{BindLevel, BindPolicy, core_ranges},
    error::LaunchError,
    plan::LaunchPlan,
};

/// MVAPICH2 through its hydra process manager.
pub struct Mvapich2;

/// Settings MVAPICH2 needs on every launch.
const HACKS: &[(&str, &str)] = &[("MV2_HOMOGENEOUS_CLUSTER", "1")];

impl LauncherProfile for Mvapich2 {
    fn executable(&self) -> &'static str {
        "mpiexec.hydra"
    }

    fn render(&self, plan: &LaunchPlan, nodefile: &Path) -> Result<Rendering, LaunchError> {
        let mut r = Rendering::default();
        r.arg("-np")
            .arg(plan.geometry.num_ranks.to_string())
            .arg("-machinefile")
            .arg(nodefile.to_string_lossy());

        let binding = plan.binding;
        let level = match binding.level {
            BindLevel::Core => Some("core"),
            BindLevel::Socket => Some("socket"),
            BindLevel::NumaNode => Some("numanode"),
            BindLevel::Arbitrary | BindLevel::Off => None,
        };
        match (binding.policy, level) {
            (BindPolicy::Scatter | BindPolicy::Compact, Some(level)) => {
                let policy = if binding.policy == BindPolicy::Scatter {
                    "scatter"
                } else {
                    "bunch"
                };
                r.env("MV2_ENABLE_AFFINITY", 1)
                    .env("MV2_CPU_BINDING_POLICY", policy)
                    .env("MV2_CPU_BINDING_LEVEL", level);
            }
            (BindPolicy::Illogical, _) => {
                let geometry = &plan.geometry;
                let ranges = core_ranges(geometry.ranks_per_node.max(), geometry.threads_per_rank);
                r.env("MV2_ENABLE_AFFINITY", 1)
                    .env("MV2_CPU_MAPPING", ranges.join(":"));
            }
            _ => {
                r.env("MV2_ENABLE_AFFINITY", 0);
            }
        }

        for (key, value) in HACKS {
            r.env(key, value);
        }
        r.env("MV2_THREADS_PER_PROCESS", plan.geometry.threads_per_rank);
        common_env(&mut r, plan);
        Ok(r)
    }
}
