use clap::Parser;
use std::path::PathBuf;

pub mod binding;
pub mod config;
pub mod env;
pub mod error;
pub mod exec;
pub mod geometry;
pub mod invocation;
pub mod launch;
pub mod launcher;
pub mod logging;
pub mod modules;
pub mod placement;
pub mod plan;
pub mod rm;

use binding::BindingRequest;
use error::LaunchError;
use geometry::JobRequest;
use plan::LaunchRequest;

/// Launch an MPI application across the nodes of a PBS allocation.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Number of nodes to run on [default: all allocated]
    #[arg(short = 'N', long, allow_negative_numbers = true)]
    pub nodes: Option<i64>,
    /// Total number of ranks
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub np: Option<i64>,
    /// Ranks per node
    #[arg(long, visible_alias = "npernode", allow_negative_numbers = true)]
    pub ppn: Option<i64>,
    /// Threads per rank
    #[arg(
        short = 't',
        long,
        visible_alias = "threads",
        allow_negative_numbers = true
    )]
    pub tpp: Option<i64>,
    /// Number of allocated nodes to skip
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub node_offset: i64,
    /// Node file to use instead of the resource manager's
    #[arg(short = 'f', long, visible_alias = "machinefile")]
    pub nodefile: Option<PathBuf>,
    /// scatter (rr), compact (bunch) or none (off)
    #[arg(long)]
    pub bind_policy: Option<String>,
    /// core, socket, numanode (numa) or off (none)
    #[arg(long)]
    pub bind_level: Option<String>,
    /// Extra launcher switches, split on whitespace
    #[arg(long, allow_hyphen_values = true)]
    pub switches: Option<String>,
    /// Print the launch plan instead of running it
    #[arg(long)]
    pub dry_run: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[arg()]
    pub command: String,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn request(&self) -> Result<LaunchRequest, LaunchError> {
        let node_offset = u32::try_from(self.node_offset).map_err(|_| {
            LaunchError::InvalidParameter(format!("node offset {}", self.node_offset))
        })?;
        let binding =
            BindingRequest::parse(self.bind_policy.as_deref(), self.bind_level.as_deref())?;
        let switches = self
            .switches
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(str::to_string)
            .collect();
        let command = std::iter::once(&self.command)
            .chain(&self.args)
            .cloned()
            .collect();

        Ok(LaunchRequest {
            job: JobRequest {
                nodes: self.nodes,
                ranks: self.np,
                ranks_per_node: self.ppn,
                threads_per_rank: self.tpp,
            },
            node_offset,
            binding,
            switches,
            command,
        })
    }
}
