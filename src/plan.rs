use tracing::info;

use crate::{
    binding::{BindingDecision, BindingRequest},
    config::Topology,
    env::AmbientEnv,
    error::LaunchError,
    geometry::{JobGeometry, JobRequest, RmGeometry},
    placement::Placement,
    rm::Allocation,
};

/// Everything the user asked for, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    pub job: JobRequest,
    pub node_offset: u32,
    pub binding: BindingRequest,
    /// Extra launcher switches, appended after the rendered ones
    pub switches: Vec<String>,
    /// Application and its arguments
    pub command: Vec<String>,
}

/// A fully resolved launch, independent of the MPI stack that runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub geometry: JobGeometry,
    pub placement: Placement,
    pub binding: BindingDecision,
    pub switches: Vec<String>,
    pub command: Vec<String>,
}

impl LaunchPlan {
    pub fn resolve(
        allocation: &Allocation,
        request: &LaunchRequest,
        topology: &Topology,
        ambient: &AmbientEnv,
    ) -> Result<Self, LaunchError> {
        let rm = RmGeometry {
            num_nodes: allocation.num_nodes,
            cores_per_node: allocation.cores_per_node,
        };
        let geometry = JobGeometry::resolve(&request.job, &rm, topology)?;
        let placement = Placement::expand(allocation, &geometry, request.node_offset)?;
        let binding =
            BindingDecision::select(&geometry, topology, ambient.thread_hint(), &request.binding);
        info!(table = %placement.table, %binding, "Resolved launch plan");

        Ok(Self {
            geometry,
            placement,
            binding,
            switches: request.switches.clone(),
            command: request.command.clone(),
        })
    }
}
