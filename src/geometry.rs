//! Reconciles partially specified job geometry into a consistent one.

use std::fmt;
use tracing::{debug, info, warn};

use crate::{
    config::Topology,
    error::LaunchError,
    rm::{
        RmError,
        pbs::{NUM_NODES_VAR, NUM_PPN_VAR},
    },
};

/// Geometry as requested by the user, every field optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobRequest {
    pub nodes: Option<i64>,
    pub ranks: Option<i64>,
    pub ranks_per_node: Option<i64>,
    pub threads_per_rank: Option<i64>,
}

/// What the resource manager granted, where it said so.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmGeometry {
    pub num_nodes: Option<u32>,
    pub cores_per_node: Option<u32>,
}

/// Ranks placed on each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RanksPerNode {
    /// Every node runs the same number of ranks.
    Uniform(u32),
    /// Ranks do not divide evenly; every node runs at least `floor` ranks
    /// and the first nodes run one more.
    Uneven { floor: u32 },
}

impl RanksPerNode {
    /// Signed encoding, negative for the uneven case.
    pub fn as_signed(&self) -> i64 {
        match *self {
            Self::Uniform(n) => n as i64,
            Self::Uneven { floor } => -(floor as i64),
        }
    }

    /// Largest number of ranks any single node runs.
    pub fn max(&self) -> u32 {
        match *self {
            Self::Uniform(n) => n,
            Self::Uneven { floor } => floor + 1,
        }
    }
}

impl fmt::Display for RanksPerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_signed())
    }
}

/// Fully resolved job geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobGeometry {
    pub num_nodes: u32,
    pub num_ranks: u32,
    pub ranks_per_node: RanksPerNode,
    pub threads_per_rank: u32,
}

impl fmt::Display for JobGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes={} ranks={} ranks_per_node={} threads_per_rank={}",
            self.num_nodes, self.num_ranks, self.ranks_per_node, self.threads_per_rank
        )
    }
}

fn positive(name: &str, value: Option<i64>) -> Result<Option<u32>, LaunchError> {
    value
        .map(|v| {
            u32::try_from(v)
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    LaunchError::InvalidParameter(format!("{name} must be positive, got {v}"))
                })
        })
        .transpose()
}

fn overflow(what: &str) -> LaunchError {
    LaunchError::InvalidParameter(format!("{what} is too large"))
}

impl JobGeometry {
    pub fn resolve(
        request: &JobRequest,
        rm: &RmGeometry,
        topology: &Topology,
    ) -> Result<Self, LaunchError> {
        if let (Some(nodes), Some(ranks), Some(ppn)) =
            (request.nodes, request.ranks, request.ranks_per_node)
        {
            if nodes.checked_mul(ppn) != Some(ranks) {
                return Err(LaunchError::GeometryConflict(format!(
                    "{nodes} nodes with {ppn} ranks per node is not {ranks} ranks"
                )));
            }
        }
        if request.ranks.is_some() && request.ranks_per_node.is_some() && request.nodes.is_none() {
            return Err(LaunchError::GeometryConflict(
                "rank count and ranks per node given without a node count".to_string(),
            ));
        }

        let nodes = positive("node count", request.nodes)?;
        let ranks = positive("rank count", request.ranks)?;
        let ppn = positive("ranks per node", request.ranks_per_node)?;
        let threads = positive("threads per rank", request.threads_per_rank)?;

        let mut num_nodes = match nodes {
            Some(n) => n,
            None => rm.num_nodes.ok_or(RmError::MissingVar(NUM_NODES_VAR))?,
        };

        let rm_cores = || rm.cores_per_node.ok_or(RmError::MissingVar(NUM_PPN_VAR));
        // Ranks per node that fill the cores when each rank runs `threads`
        let fill = |cores: u32| (cores / threads.unwrap_or(1)).max(1);

        let num_ranks = match ranks {
            Some(r) => Some(r),
            None if Some(num_nodes) == rm.num_nodes || ppn.is_none() => Some(
                num_nodes
                    .checked_mul(fill(rm_cores()?))
                    .ok_or_else(|| overflow("rank count"))?,
            ),
            None => None,
        };
        debug!(num_nodes, num_ranks, "Defaulted node and rank counts");

        let ranks_per_node = match (ppn, num_ranks) {
            (Some(p), _) => RanksPerNode::Uniform(p),
            (None, Some(r)) => {
                if r < num_nodes {
                    if nodes.is_some() {
                        return Err(LaunchError::GeometryConflict(format!(
                            "{r} ranks cannot occupy {num_nodes} nodes"
                        )));
                    }
                    info!(
                        num_ranks = r,
                        "Fewer ranks than allocated nodes, using one node per rank"
                    );
                    num_nodes = r;
                }
                if r % num_nodes == 0 {
                    RanksPerNode::Uniform(r / num_nodes)
                } else {
                    RanksPerNode::Uneven {
                        floor: r / num_nodes,
                    }
                }
            }
            // Unreachable after defaulting, ranks are only left open when
            // ranks per node was given
            (None, None) => {
                return Err(LaunchError::InvalidParameter(
                    "unable to determine rank count".to_string(),
                ));
            }
        };

        let num_ranks = match ranks_per_node {
            RanksPerNode::Uniform(p) => {
                let total = num_nodes
                    .checked_mul(p)
                    .ok_or_else(|| overflow("rank count"))?;
                if let Some(r) = num_ranks.filter(|r| *r != total) {
                    info!(
                        previous = r,
                        num_ranks = total,
                        "Recalculated rank count from ranks per node"
                    );
                }
                total
            }
            // Uneven is only produced from a known rank count
            RanksPerNode::Uneven { .. } => num_ranks.unwrap_or_default(),
        };

        let threads_per_rank = threads.unwrap_or(1);
        if let Some(cores) = rm.cores_per_node {
            if ranks_per_node.max() > cores {
                warn!(
                    ranks_per_node = ranks_per_node.max(),
                    cores_per_node = cores,
                    "More ranks per node than allocated cores"
                );
            }
        }

        if num_nodes > topology.max_nodes_per_job {
            return Err(LaunchError::QuotaExceeded {
                requested: num_nodes,
                limit: topology.max_nodes_per_job,
            });
        }

        let geometry = Self {
            num_nodes,
            num_ranks,
            ranks_per_node,
            threads_per_rank,
        };
        info!(%geometry, "Resolved job geometry");
        Ok(geometry)
    }
}
