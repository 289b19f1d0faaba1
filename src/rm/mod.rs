use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

pub mod pbs;

pub use pbs::PbsEnvironment;

#[derive(Debug, Error)]
pub enum RmError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
    #[error("Unable to read node file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed entry on line {line} of node file {path:?}")]
    MalformedLine { path: PathBuf, line: usize },
    #[error("Node file {0:?} is empty")]
    Empty(PathBuf),
}

/// The nodes granted by the resource manager, as listed in its node file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Node file the slots were read from
    pub source: PathBuf,
    /// One entry per allocated slot, in file order
    pub slots: Vec<String>,
    /// Node count reported by the resource manager
    pub num_nodes: Option<u32>,
    /// Core count per node reported by the resource manager
    pub cores_per_node: Option<u32>,
}

impl Allocation {
    pub fn read(path: &Path, pbs: &PbsEnvironment) -> Result<Self, RmError> {
        let contents = fs::read_to_string(path).map_err(|source| RmError::Unreadable {
            path: path.to_owned(),
            source,
        })?;
        let slots = parse_nodefile(&contents)
            .map_err(|line| RmError::MalformedLine {
                path: path.to_owned(),
                line,
            })?;
        if slots.is_empty() {
            return Err(RmError::Empty(path.to_owned()));
        }
        debug!(path = %path.display(), slots = slots.len(), "Read node file");

        Ok(Self {
            source: path.to_owned(),
            slots,
            num_nodes: pbs.num_nodes,
            cores_per_node: pbs.cores_per_node,
        })
    }

    /// Unique node names, in order of first appearance.
    pub fn distinct_nodes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.slots
            .iter()
            .map(String::as_str)
            .filter(|n| seen.insert(*n))
            .collect()
    }
}

/// Parse node file contents, returning the 1-based number of the first
/// malformed line on failure. Trailing blank lines are allowed.
pub fn parse_nodefile(contents: &str) -> Result<Vec<String>, usize> {
    let lines = contents.trim_end().lines().collect::<Vec<_>>();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let node = line.trim();
            if node.is_empty() || node.contains(char::is_whitespace) {
                Err(i + 1)
            } else {
                Ok(node.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    use tempdir::TempDir;

    #[test]
    fn test_parse_nodefile() {
        let nodes = parse_nodefile("n01\nn01\n  n02\nn02\n\n").unwrap();
        assert_eq!(nodes, ["n01", "n01", "n02", "n02"]);
        assert_eq!(parse_nodefile("n01\n\nn02\n"), Err(2));
        assert_eq!(parse_nodefile("n01\nn02 n03\n"), Err(2));
        assert_eq!(parse_nodefile("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_read() {
        let dir = TempDir::new("allocation-test").unwrap();
        let path = dir.path().join("nodes");
        fs::write(&path, "a\na\nb\nb\nc\nc\n").unwrap();
        let pbs = PbsEnvironment {
            nodefile: Some(path.clone()),
            num_nodes: Some(3),
            cores_per_node: Some(2),
            job_id: None,
        };
        let alloc = Allocation::read(&path, &pbs).unwrap();
        assert_eq!(alloc.slots.len(), 6);
        assert_eq!(alloc.distinct_nodes(), ["a", "b", "c"]);
        assert_eq!(alloc.num_nodes, Some(3));

        fs::write(&path, "").unwrap();
        assert!(matches!(
            Allocation::read(&path, &pbs),
            Err(RmError::Empty(_))
        ));
        assert!(matches!(
            Allocation::read(&dir.path().join("missing"), &pbs),
            Err(RmError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_distinct_preserves_order() {
        let alloc = Allocation {
            source: PathBuf::new(),
            slots: ["b", "a", "b", "c", "a"].map(String::from).to_vec(),
            num_nodes: None,
            cores_per_node: None,
        };
        assert_eq!(alloc.distinct_nodes(), ["b", "a", "c"]);
    }
}
