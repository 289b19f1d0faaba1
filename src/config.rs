use nix::unistd;
use tracing::{debug, warn};

/// Hardware and policy constants for the cluster the job runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub cores_per_socket: u32,
    pub cores_per_node: u32,
    pub max_nodes_per_job: u32,
}

struct SystemProfile {
    pattern: &'static str,
    topology: Topology,
}

const DEFAULT_TOPOLOGY: Topology = Topology {
    cores_per_socket: 8,
    cores_per_node: 16,
    max_nodes_per_job: 256,
};

/// Known systems, matched against the local hostname in order.
const PROFILES: &[SystemProfile] = &[
    SystemProfile {
        pattern: "fat*",
        topology: Topology {
            cores_per_socket: 8,
            cores_per_node: 32,
            max_nodes_per_job: 4,
        },
    },
    SystemProfile {
        pattern: "gpu*",
        topology: Topology {
            cores_per_socket: 12,
            cores_per_node: 24,
            max_nodes_per_job: 16,
        },
    },
    SystemProfile {
        pattern: "node*",
        topology: Topology {
            cores_per_socket: 10,
            cores_per_node: 20,
            max_nodes_per_job: 512,
        },
    },
];

/// `prefix*` matches by prefix, anything else must match exactly.
fn matches(pattern: &str, hostname: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => hostname.starts_with(prefix),
        None => hostname == pattern,
    }
}

impl Topology {
    pub fn for_hostname(hostname: &str) -> Self {
        PROFILES
            .iter()
            .find(|p| matches(p.pattern, hostname))
            .map(|p| {
                debug!(hostname, pattern = p.pattern, "Matched system profile");
                p.topology
            })
            .unwrap_or(DEFAULT_TOPOLOGY)
    }

    /// Topology of the host we are running on.
    pub fn detect() -> Self {
        match unistd::gethostname() {
            Ok(name) => Self::for_hostname(&name.to_string_lossy()),
            Err(e) => {
                warn!(error = %e, "Unable to read hostname, using default topology");
                DEFAULT_TOPOLOGY
            }
        }
    }
}
