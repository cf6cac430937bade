use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;

pub mod docker;
pub use docker::DockerRuntime;

/// A cluster-scope overlay network as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// A node participating in an overlay network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPeer {
    pub name: String,
    pub address: String,
}

/// What this node's runtime knows about one network.
#[derive(Debug, Clone, Default)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
    /// Addresses bound to containers on this node, without prefix length.
    pub container_addresses: BTreeSet<String>,
}

/// Read-only view of the orchestration runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Swarm-scoped overlay networks only.
    async fn list_overlay_networks(&self) -> Result<Vec<NetworkSummary>>;

    /// Fails with `NetworkNotFound` when the network is not set up on
    /// this node.
    async fn inspect_network(&self, network_id: &str) -> Result<NetworkDetails>;

    /// Nodes participating in the network, as `{Name, IP}` pairs.
    async fn network_peers(&self, network_id: &str) -> Result<Vec<NetworkPeer>>;

    /// This node's cluster management address.
    async fn node_address(&self) -> Result<String>;
}
