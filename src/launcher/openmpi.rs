use std::path::Path;

use super::{LauncherProfile, Rendering, common_env};
use crate::{
    binding::{BindLevel, BindPolicy, BindingDecision},
    error::LaunchError,
    modules::MpiVersion,
    plan::LaunchPlan,
};

/// Settings Open MPI needs on every launch.
const HACKS: &[(&str, &str)] = &[
    ("OMPI_MCA_mpi_warn_on_fork", "0"),
    ("OMPI_MCA_btl_openib_warn_default_gid_prefix", "0"),
];

/// First release with `--map-by`/`--bind-to` and NUMA binding.
const MAP_BY_SINCE: [u32; 2] = [1, 7];

pub struct OpenMpi {
    version: MpiVersion,
}

impl OpenMpi {
    pub fn new(version: MpiVersion) -> Self {
        Self { version }
    }

    fn binding_args(&self, binding: BindingDecision, threads: u32) -> Vec<String> {
        let (map_by, bind_to) = match (binding.policy, binding.level) {
            (BindPolicy::Scatter, BindLevel::Core) => ("socket", "core"),
            (BindPolicy::Compact, BindLevel::Core) => ("core", "core"),
            (BindPolicy::Scatter, BindLevel::Socket) => ("socket", "socket"),
            (BindPolicy::Compact, BindLevel::Socket) => ("core", "socket"),
            (BindPolicy::Scatter, BindLevel::NumaNode) => ("numa", "numa"),
            (BindPolicy::Compact, BindLevel::NumaNode) => ("core", "numa"),
            (BindPolicy::Illogical, _) => {
                return vec![
                    "--map-by".to_string(),
                    format!("slot:PE={threads}"),
                    "--bind-to".to_string(),
                    "core".to_string(),
                ];
            }
            _ => return vec!["--bind-to".to_string(), "none".to_string()],
        };
        ["--map-by", map_by, "--bind-to", bind_to]
            .map(String::from)
            .to_vec()
    }

    fn legacy_binding_args(
        &self,
        binding: BindingDecision,
        threads: u32,
    ) -> Result<Vec<String>, LaunchError> {
        let args: &[&str] = match (binding.policy, binding.level) {
            (_, BindLevel::NumaNode) => {
                return Err(LaunchError::UnsupportedFeature {
                    feature: "numanode binding".to_string(),
                    stack: format!("openmpi {}", self.version),
                });
            }
            (BindPolicy::Scatter, BindLevel::Core) => &["--bysocket", "--bind-to-core"],
            (BindPolicy::Compact, BindLevel::Core) => &["--bycore", "--bind-to-core"],
            (BindPolicy::Scatter, BindLevel::Socket) => &["--bysocket", "--bind-to-socket"],
            (BindPolicy::Compact, BindLevel::Socket) => &["--bycore", "--bind-to-socket"],
            (BindPolicy::Illogical, _) => {
                return Ok(vec![
                    "--cpus-per-proc".to_string(),
                    threads.to_string(),
                    "--bind-to-core".to_string(),
                ]);
            }
            _ => &["--bind-to-none"],
        };
        Ok(args.iter().map(|a| a.to_string()).collect())
    }
}

impl LauncherProfile for OpenMpi {
    fn executable(&self) -> &'static str {
        "mpirun"
    }

    fn render(&self, plan: &LaunchPlan, nodefile: &Path) -> Result<Rendering, LaunchError> {
        let threads = plan.geometry.threads_per_rank;
        let binding = if self.version >= MpiVersion::new(&MAP_BY_SINCE) {
            self.binding_args(plan.binding, threads)
        } else {
            self.legacy_binding_args(plan.binding, threads)?
        };

        let mut r = Rendering::default();
        r.arg("-np")
            .arg(plan.geometry.num_ranks.to_string())
            .arg("--hostfile")
            .arg(nodefile.to_string_lossy());
        r.args.extend(binding);

        for (key, value) in HACKS {
            r.env(key, value);
        }
        common_env(&mut r, plan);

        // mpirun only forwards what it is told to
        let exports = r
            .env
            .iter()
            .flat_map(|(key, _)| ["-x".to_string(), key.clone()])
            .collect::<Vec<_>>();
        r.args.extend(exports);
        Ok(r)
    }
}
