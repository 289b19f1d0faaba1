use std::{fmt, path::PathBuf};

use anyhow::{Context, Error};
use tracing::info;

use crate::{
    config::Topology,
    env::AmbientEnv,
    error::LaunchError,
    invocation::Invocation,
    modules::MpiModule,
    placement::NodeFile,
    plan::{LaunchPlan, LaunchRequest},
    rm::{Allocation, PbsEnvironment},
};

const TEMPDIR_PREFIX: &str = "pbs-mpirun";

/// A launch ready to run. Dropping it removes any generated node file.
#[derive(Debug)]
pub struct Launch {
    pub plan: LaunchPlan,
    pub module: MpiModule,
    pub nodefile: NodeFile,
    pub invocation: Invocation,
}

impl Launch {
    pub fn prepare(
        request: &LaunchRequest,
        nodefile: Option<PathBuf>,
        ambient: &AmbientEnv,
        topology: &Topology,
    ) -> Result<Self, Error> {
        let pbs = PbsEnvironment::from_env(ambient).map_err(LaunchError::from)?;
        let path = pbs.nodefile(nodefile).map_err(LaunchError::from)?;
        let allocation = Allocation::read(&path, &pbs).map_err(LaunchError::from)?;

        let plan = LaunchPlan::resolve(&allocation, request, topology, ambient)?;
        let module = MpiModule::detect(ambient)?;
        let profile = module.profile();

        let prefix = match &pbs.job_id {
            Some(id) => format!("{TEMPDIR_PREFIX}.{id}"),
            None => TEMPDIR_PREFIX.to_string(),
        };
        let nodefile = NodeFile::materialize(&plan.placement.nodefile, &prefix)
            .context("Failed to write node file")?;

        let rendering = profile.render(&plan, nodefile.path())?;
        let invocation = Invocation::build(profile.executable(), rendering, &plan, ambient);
        info!(command = %invocation, "Prepared launch");

        Ok(Self {
            plan,
            module,
            nodefile,
            invocation,
        })
    }
}

/// The dry-run report.
impl fmt::Display for Launch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = &self.plan;
        writeln!(f, "geometry: {}", plan.geometry)?;
        writeln!(f, "placement: {}", plan.placement.table)?;
        writeln!(f, "binding: {}", plan.binding)?;
        writeln!(f, "stack: {} {}", self.module.stack, self.module.version)?;
        writeln!(f, "nodefile: {}", self.nodefile.path().display())?;
        for line in plan.placement.table.render().lines() {
            writeln!(f, "  {line}")?;
        }
        for (key, value) in &self.invocation.env {
            writeln!(f, "env: {key}={value}")?;
        }
        writeln!(f, "command: {}", self.invocation)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    use std::fs;
    use tempdir::TempDir;

    use crate::geometry::JobRequest;

    const TOPOLOGY: Topology = Topology {
        cores_per_socket: 4,
        cores_per_node: 8,
        max_nodes_per_job: 16,
    };

    fn ambient(dir: &TempDir, modules: &str) -> AmbientEnv {
        ambient_for_job(dir, modules, "42.master")
    }

    fn ambient_for_job(dir: &TempDir, modules: &str, job_id: &str) -> AmbientEnv {
        let path = dir.path().join("aux");
        let slots = ["n1", "n2"].map(|n| format!("{n}\n").repeat(8)).concat();
        fs::write(&path, slots).unwrap();
        AmbientEnv::from_iter([
            ("PBS_NODEFILE", path.to_string_lossy().into_owned()),
            ("PBS_NUM_NODES", "2".to_string()),
            ("PBS_NUM_PPN", "8".to_string()),
            ("PBS_JOBID", job_id.to_string()),
            ("LOADEDMODULES", modules.to_string()),
        ])
    }

    fn request(ranks: i64) -> LaunchRequest {
        LaunchRequest {
            job: JobRequest {
                ranks: Some(ranks),
                ..Default::default()
            },
            command: vec!["./a.out".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_generated() {
        let dir = TempDir::new("pbs-mpirun-test").unwrap();
        let env = ambient(&dir, "gcc/9.3:openmpi/1.8.4");
        let launch = Launch::prepare(&request(3), None, &env, &TOPOLOGY).unwrap();

        assert_eq!(launch.plan.placement.table.counts(), [2, 1]);
        let path = launch.nodefile.path().to_owned();
        assert_eq!(fs::read_to_string(&path).unwrap(), "n1\nn1\nn2\n");
        assert_eq!(launch.invocation.program, "mpirun");
        assert_eq!(launch.invocation.args.last().unwrap(), "./a.out");

        let report = launch.to_string();
        assert!(report.contains("placement: n1:2 n2:1"));
        assert!(report.contains("env: OMP_NUM_THREADS=1"));

        drop(launch);
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_reuses_rm_file() {
        let dir = TempDir::new("pbs-mpirun-test").unwrap();
        let env = ambient(&dir, "mvapich2/2.3");
        let launch = Launch::prepare(&request(16), None, &env, &TOPOLOGY).unwrap();
        let path = dir.path().join("aux");
        assert_eq!(launch.nodefile.path(), path.as_path());
        drop(launch);
        assert!(path.exists());
    }

    /// Scratch directories `Launch::prepare` created for a job.
    fn scratch_dirs(job_id: &str) -> Vec<std::path::PathBuf> {
        let prefix = format!("{TEMPDIR_PREFIX}.{job_id}.");
        fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect()
    }

    #[test]
    fn test_failed_render_removes_nodefile() {
        let dir = TempDir::new("pbs-mpirun-test").unwrap();
        let job_id = format!("{}.cleanup", std::process::id());
        let env = ambient_for_job(&dir, "mpich2/1.4", &job_id);

        // Four ranks on two nodes cannot reuse the sixteen-slot file
        let e = Launch::prepare(&request(4), None, &env, &TOPOLOGY).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<LaunchError>(),
            Some(LaunchError::UnsupportedStack(_))
        ));
        assert!(scratch_dirs(&job_id).is_empty());

        // The same request on a supported stack does write one
        let env = ambient_for_job(&dir, "openmpi/1.8.4", &job_id);
        let launch = Launch::prepare(&request(4), None, &env, &TOPOLOGY).unwrap();
        assert_eq!(scratch_dirs(&job_id).len(), 1);
        drop(launch);
        assert!(scratch_dirs(&job_id).is_empty());
    }

    #[test]
    fn test_prepare_errors() {
        let dir = TempDir::new("pbs-mpirun-test").unwrap();

        let env = ambient(&dir, "gcc/9.3");
        let e = Launch::prepare(&request(4), None, &env, &TOPOLOGY).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<LaunchError>(),
            Some(LaunchError::NoMpiModuleLoaded)
        ));

        let env = ambient(&dir, "mpich2/1.4");
        let e = Launch::prepare(&request(4), None, &env, &TOPOLOGY).unwrap_err();
        assert_eq!(e.downcast_ref::<LaunchError>().unwrap().exit_code(), 17);

        let e = Launch::prepare(&request(4), None, &AmbientEnv::default(), &TOPOLOGY)
            .unwrap_err();
        assert!(matches!(
            e.downcast_ref::<LaunchError>(),
            Some(LaunchError::ResourceManagerMismatch(_))
        ));
    }
}
