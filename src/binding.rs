//! CPU affinity policy selection.

use std::{fmt, str::FromStr};
use tracing::{debug, warn};

use crate::{config::Topology, error::LaunchError, geometry::JobGeometry};

/// How ranks are spread over the binding level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPolicy {
    Scatter,
    Compact,
    /// Explicit per-rank core ranges, only chosen automatically.
    Illogical,
    None,
}

/// Topology granularity a rank is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindLevel {
    Core,
    Socket,
    NumaNode,
    /// Paired with `BindPolicy::Illogical`.
    Arbitrary,
    Off,
}

impl FromStr for BindPolicy {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scatter" | "rr" => Ok(Self::Scatter),
            "compact" | "bunch" => Ok(Self::Compact),
            "none" | "off" => Ok(Self::None),
            _ => Err(LaunchError::InvalidParameter(format!(
                "unknown binding policy {s:?}, expected scatter, compact or none"
            ))),
        }
    }
}

impl FromStr for BindLevel {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "socket" => Ok(Self::Socket),
            "numanode" | "numa" => Ok(Self::NumaNode),
            "none" | "off" => Ok(Self::Off),
            _ => Err(LaunchError::InvalidParameter(format!(
                "unknown binding level {s:?}, expected core, socket, numanode or none"
            ))),
        }
    }
}

impl fmt::Display for BindPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scatter => "scatter",
            Self::Compact => "compact",
            Self::Illogical => "illogical",
            Self::None => "none",
        })
    }
}

impl fmt::Display for BindLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Core => "core",
            Self::Socket => "socket",
            Self::NumaNode => "numanode",
            Self::Arbitrary => "arbitrary",
            Self::Off => "off",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDecision {
    pub policy: BindPolicy,
    pub level: BindLevel,
}

impl fmt::Display for BindingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.policy, self.level)
    }
}

/// Binding preferences given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingRequest {
    pub policy: Option<BindPolicy>,
    pub level: Option<BindLevel>,
}

impl BindingRequest {
    pub fn parse(policy: Option<&str>, level: Option<&str>) -> Result<Self, LaunchError> {
        Ok(Self {
            policy: policy.map(|p| p.parse::<BindPolicy>()).transpose()?,
            level: level.map(|l| l.parse::<BindLevel>()).transpose()?,
        })
    }
}

impl BindingDecision {
    const DISABLED: Self = Self {
        policy: BindPolicy::None,
        level: BindLevel::Off,
    };

    /// Default for a thread count, `None` meaning binding is disabled.
    fn default_for(threads: Option<u32>, topology: &Topology) -> Self {
        let (policy, level) = match threads {
            Some(1) => (BindPolicy::Scatter, BindLevel::Core),
            Some(t) if t == topology.cores_per_socket => (BindPolicy::Scatter, BindLevel::Socket),
            Some(_) => (BindPolicy::Illogical, BindLevel::Arbitrary),
            None => return Self::DISABLED,
        };
        Self { policy, level }
    }

    /// Restore the pairing invariants after user overrides, keeping the
    /// field the user asked for.
    fn reconcile(self, request: &BindingRequest) -> Self {
        let paired = matches!(
            (self.policy, self.level),
            (BindPolicy::None, BindLevel::Off)
                | (BindPolicy::Illogical, BindLevel::Arbitrary)
                | (
                    BindPolicy::Scatter | BindPolicy::Compact,
                    BindLevel::Core | BindLevel::Socket | BindLevel::NumaNode
                )
        );
        if paired {
            return self;
        }
        if request.policy == Some(BindPolicy::None) || request.level == Some(BindLevel::Off) {
            return Self::DISABLED;
        }
        let policy = match self.policy {
            BindPolicy::None | BindPolicy::Illogical => BindPolicy::Scatter,
            policy => policy,
        };
        let level = match self.level {
            BindLevel::Off | BindLevel::Arbitrary => BindLevel::Core,
            level => level,
        };
        Self { policy, level }
    }

    pub fn select(
        geometry: &JobGeometry,
        topology: &Topology,
        thread_hint: Option<u32>,
        request: &BindingRequest,
    ) -> Self {
        let threads = match thread_hint {
            Some(hint) if hint != geometry.threads_per_rank => {
                warn!(
                    hint,
                    threads_per_rank = geometry.threads_per_rank,
                    "Ambient thread count disagrees with threads per rank, not binding by default"
                );
                None
            }
            _ => Some(geometry.threads_per_rank),
        };

        let default = Self::default_for(threads, topology);
        let decision = Self {
            policy: request.policy.unwrap_or(default.policy),
            level: request.level.unwrap_or(default.level),
        }
        .reconcile(request);

        let used = geometry.threads_per_rank as u64 * geometry.ranks_per_node.max() as u64;
        if decision.policy == BindPolicy::Illogical && used > topology.cores_per_node as u64 {
            warn!(
                threads_per_rank = geometry.threads_per_rank,
                ranks_per_node = geometry.ranks_per_node.max(),
                cores_per_node = topology.cores_per_node,
                "Threads overload the node, disabling binding"
            );
            return Self::DISABLED;
        }

        debug!(%decision, %default, "Selected binding");
        decision
    }
}

/// Contiguous `threads`-wide core ranges, one per rank slot on a node.
pub fn core_ranges(ranks_per_node: u32, threads: u32) -> Vec<String> {
    (0..ranks_per_node)
        .map(|slot| {
            let first = slot * threads;
            let last = first + threads - 1;
            if first == last {
                first.to_string()
            } else {
                format!("{first}-{last}")
            }
        })
        .collect()
}
