//! Per-node rank placement and the node file handed to the launcher.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use tempdir::TempDir;
use tracing::{debug, info};

use crate::{
    error::LaunchError,
    geometry::{JobGeometry, RanksPerNode},
    rm::Allocation,
};

/// Ranks assigned to each node, in launch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementTable(pub Vec<(String, u32)>);

impl PlacementTable {
    pub fn num_ranks(&self) -> u32 {
        self.0.iter().map(|(_, n)| n).sum()
    }

    pub fn num_nodes(&self) -> usize {
        self.0.len()
    }

    pub fn counts(&self) -> Vec<u32> {
        self.0.iter().map(|(_, n)| *n).collect()
    }

    /// One line per rank, nodes repeated by their rank count.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .flat_map(|(node, n)| (0..*n).map(move |_| node.as_str()))
            .fold(String::new(), |mut s, node| {
                s.push_str(node);
                s.push('\n');
                s
            })
    }

    /// Inverse of `render`: consecutive identical lines form one entry.
    pub fn parse(contents: &str) -> Self {
        let mut table: Vec<(String, u32)> = Vec::new();
        for node in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match table.last_mut() {
                Some((last, n)) if last.as_str() == node => *n += 1,
                _ => table.push((node.to_string(), 1)),
            }
        }
        Self(table)
    }

    /// Counts ranks per node of a node file that may interleave nodes.
    fn tally(slots: &[String], nodes: &[&str]) -> Self {
        Self(
            nodes
                .iter()
                .map(|node| {
                    let n = slots.iter().filter(|s| s.as_str() == *node).count() as u32;
                    (node.to_string(), n)
                })
                .collect(),
        )
    }
}

impl fmt::Display for PlacementTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (node, n) in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{node}:{n}")?;
            first = false;
        }
        Ok(())
    }
}

/// Where the launcher's node file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFileSpec {
    /// The resource manager's own file already matches the request.
    ResourceManager(PathBuf),
    /// A node file must be written with these contents.
    Generated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub table: PlacementTable,
    pub nodefile: NodeFileSpec,
}

impl Placement {
    pub fn expand(
        allocation: &Allocation,
        geometry: &JobGeometry,
        node_offset: u32,
    ) -> Result<Self, LaunchError> {
        let distinct = allocation.distinct_nodes();
        let listed = distinct.len() as u32;
        if let Some(reported) = allocation.num_nodes.filter(|n| *n != listed) {
            return Err(LaunchError::AllocationMismatch { listed, reported });
        }

        let available = listed.saturating_sub(node_offset);
        if available < geometry.num_nodes {
            return Err(LaunchError::InsufficientNodes {
                requested: geometry.num_nodes,
                available,
            });
        }

        let provided = allocation
            .num_nodes
            .zip(allocation.cores_per_node)
            .map(|(n, c)| n as u64 * c as u64);
        let requested = geometry.num_nodes as u64 * geometry.ranks_per_node.max() as u64;
        if node_offset == 0
            && geometry.num_nodes == listed
            && matches!(geometry.ranks_per_node, RanksPerNode::Uniform(_))
            && provided == Some(requested)
            && allocation.slots.len() as u64 == requested
        {
            info!(path = %allocation.source.display(), "Reusing resource manager node file");
            return Ok(Self {
                table: PlacementTable::tally(&allocation.slots, &distinct),
                nodefile: NodeFileSpec::ResourceManager(allocation.source.clone()),
            });
        }

        let used = &distinct[node_offset as usize..][..geometry.num_nodes as usize];
        let table: Vec<(String, u32)> = match geometry.ranks_per_node {
            RanksPerNode::Uniform(n) => used.iter().map(|node| (node.to_string(), n)).collect(),
            RanksPerNode::Uneven { floor } => {
                let remainder = geometry.num_ranks - geometry.num_nodes * floor;
                used.iter()
                    .enumerate()
                    .map(|(i, node)| {
                        let extra = u32::from((i as u32) < remainder);
                        (node.to_string(), floor + extra)
                    })
                    .collect()
            }
        };
        let table = PlacementTable(table);
        debug!(%table, node_offset, "Rebuilt placement table");

        Ok(Self {
            nodefile: NodeFileSpec::Generated(table.render()),
            table,
        })
    }
}

/// A node file on disk, removed on drop unless owned by the resource
/// manager.
#[derive(Debug)]
pub struct NodeFile {
    path: PathBuf,
    _dir: Option<TempDir>,
}

const NODEFILE_NAME: &str = "nodefile";

impl NodeFile {
    pub fn materialize(spec: &NodeFileSpec, prefix: &str) -> io::Result<Self> {
        match spec {
            NodeFileSpec::ResourceManager(path) => Ok(Self {
                path: path.clone(),
                _dir: None,
            }),
            NodeFileSpec::Generated(contents) => {
                let dir = TempDir::new(prefix)?;
                let path = dir.path().join(NODEFILE_NAME);
                fs::write(&path, contents)?;
                debug!(path = %path.display(), "Wrote node file");
                Ok(Self {
                    path,
                    _dir: Some(dir),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
