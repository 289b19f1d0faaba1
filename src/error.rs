use thiserror::Error;

use crate::rm::RmError;

/// Fatal conditions that abort a launch before the launcher is spawned.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Conflicting job geometry: {0}")]
    GeometryConflict(String),
    #[error("Resource manager mismatch: {0}")]
    ResourceManagerMismatch(#[from] RmError),
    #[error("Requested {requested} nodes, but only {available} are available")]
    InsufficientNodes { requested: u32, available: u32 },
    #[error("Node file lists {listed} unique nodes, resource manager reports {reported}")]
    AllocationMismatch { listed: u32, reported: u32 },
    #[error("Requested {requested} nodes exceeds the limit of {limit} nodes per job")]
    QuotaExceeded { requested: u32, limit: u32 },
    #[error("No MPI module loaded")]
    NoMpiModuleLoaded,
    #[error("Unsupported MPI stack: {0}")]
    UnsupportedStack(String),
    #[error("{feature} is not supported by {stack}")]
    UnsupportedFeature { feature: String, stack: String },
}

impl LaunchError {
    /// Process exit code reported for this error, distinct per kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidParameter(_) => 10,
            Self::GeometryConflict(_) => 11,
            Self::ResourceManagerMismatch(_) => 12,
            Self::InsufficientNodes { .. } => 13,
            Self::AllocationMismatch { .. } => 14,
            Self::QuotaExceeded { .. } => 15,
            Self::NoMpiModuleLoaded => 16,
            Self::UnsupportedStack(_) => 17,
            Self::UnsupportedFeature { .. } => 18,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exit_codes_distinct() {
        let errors = [
            LaunchError::InvalidParameter("x".into()),
            LaunchError::GeometryConflict("x".into()),
            LaunchError::ResourceManagerMismatch(RmError::MissingVar("PBS_NODEFILE")),
            LaunchError::InsufficientNodes {
                requested: 2,
                available: 1,
            },
            LaunchError::AllocationMismatch {
                listed: 2,
                reported: 1,
            },
            LaunchError::QuotaExceeded {
                requested: 2,
                limit: 1,
            },
            LaunchError::NoMpiModuleLoaded,
            LaunchError::UnsupportedStack("mpich2".into()),
            LaunchError::UnsupportedFeature {
                feature: "numanode".into(),
                stack: "openmpi".into(),
            },
        ];
        let mut codes = errors.iter().map(|e| e.exit_code()).collect::<Vec<_>>();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| *c != 0 && *c != 1));
    }
}
