use std::path::PathBuf;
use tracing::info;

use super::RmError;
use crate::env::AmbientEnv;

/// Environment variable names
const NODEFILE_VAR: &str = "PBS_NODEFILE";
pub const NUM_NODES_VAR: &str = "PBS_NUM_NODES";
pub const NUM_PPN_VAR: &str = "PBS_NUM_PPN";
const JOB_ID_VAR: &str = "PBS_JOBID";

/// Allocation details published by Torque/PBS to the job's environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbsEnvironment {
    /// Path to the node file, one line per allocated slot
    pub nodefile: Option<PathBuf>,
    /// Number of allocated nodes
    pub num_nodes: Option<u32>,
    /// Number of cores allocated on each node
    pub cores_per_node: Option<u32>,
    /// Job identifier
    pub job_id: Option<String>,
}

impl PbsEnvironment {
    /// Read the allocation from the job environment
    ///
    /// Expected environment variables:
    /// - PBS_NODEFILE: Node file path
    /// - PBS_NUM_NODES: Number of allocated nodes
    /// - PBS_NUM_PPN: Cores per node
    /// - PBS_JOBID: (optional) Job identifier
    ///
    /// Missing values are only reported once something needs them, present
    /// but unparseable values are rejected immediately.
    pub fn from_env(env: &AmbientEnv) -> Result<Self, RmError> {
        let nodefile = env.get(NODEFILE_VAR).map(PathBuf::from);
        let num_nodes = Self::parse_count(env, NUM_NODES_VAR)?;
        let cores_per_node = Self::parse_count(env, NUM_PPN_VAR)?;
        let job_id = env.get(JOB_ID_VAR).map(str::to_string);

        let pbs = Self {
            nodefile,
            num_nodes,
            cores_per_node,
            job_id,
        };

        info!(
            job_id = pbs.job_id.as_deref(),
            num_nodes = pbs.num_nodes,
            cores_per_node = pbs.cores_per_node,
            "Resource manager environment loaded"
        );

        Ok(pbs)
    }

    fn parse_count(env: &AmbientEnv, var: &'static str) -> Result<Option<u32>, RmError> {
        env.get(var)
            .map(|v| match v.trim().parse() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(RmError::InvalidValue(var)),
            })
            .transpose()
    }

    /// The node file to read, preferring an explicit override
    pub fn nodefile(&self, over: Option<PathBuf>) -> Result<PathBuf, RmError> {
        over.or_else(|| self.nodefile.clone())
            .ok_or(RmError::MissingVar(NODEFILE_VAR))
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_from_env() {
        let env = AmbientEnv::from_iter([
            (NODEFILE_VAR, "/var/spool/aux/1234"),
            (NUM_NODES_VAR, "4"),
            (NUM_PPN_VAR, "16"),
            (JOB_ID_VAR, "1234.master"),
        ]);
        let pbs = PbsEnvironment::from_env(&env).unwrap();
        assert_eq!(pbs.num_nodes, Some(4));
        assert_eq!(pbs.cores_per_node, Some(16));
        assert_eq!(pbs.job_id.as_deref(), Some("1234.master"));
        assert_eq!(
            pbs.nodefile(None).unwrap(),
            PathBuf::from("/var/spool/aux/1234")
        );
        assert_eq!(
            pbs.nodefile(Some("hosts".into())).unwrap(),
            PathBuf::from("hosts")
        );
    }

    #[test]
    fn test_missing_values() {
        let pbs = PbsEnvironment::from_env(&AmbientEnv::default()).unwrap();
        assert!(matches!(
            pbs.nodefile(None),
            Err(RmError::MissingVar(NODEFILE_VAR))
        ));
        assert_eq!(pbs.num_nodes, None);
        assert_eq!(pbs.cores_per_node, None);
    }

    #[test]
    fn test_invalid_values() {
        for bad in ["zero", "0", "-2"] {
            let env = AmbientEnv::from_iter([(NUM_NODES_VAR, bad)]);
            assert!(matches!(
                PbsEnvironment::from_env(&env),
                Err(RmError::InvalidValue(NUM_NODES_VAR))
            ));
        }
    }
}
