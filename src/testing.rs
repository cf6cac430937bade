//! In-memory stand-ins for the runtime, the diagnostic server and peers.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::coordinator::PeerClient;
use crate::error::{HealError, Result};
use crate::runtime::{ContainerRuntime, NetworkDetails, NetworkPeer, NetworkSummary};
use crate::sidecar::{DiagnosticSidecar, RawEntry};
use crate::types::TableName;

pub struct FakeRuntime {
    networks: Vec<(NetworkDetails, Vec<NetworkPeer>)>,
    node_address: String,
    broken: bool,
}

impl FakeRuntime {
    /// One network `backend` with peers node-a/b/c at 192.168.0.1/2/3.
    pub fn single_network(id: &str, node_address: &str, local: &[&str]) -> Self {
        let mut runtime = Self {
            networks: Vec::new(),
            node_address: node_address.into(),
            broken: false,
        };
        runtime.add_network(id, "backend", local);
        runtime
    }

    pub fn broken() -> Self {
        Self {
            networks: Vec::new(),
            node_address: String::new(),
            broken: true,
        }
    }

    pub fn add_network(&mut self, id: &str, name: &str, local: &[&str]) {
        let peers = [
            ("node-a", "192.168.0.1"),
            ("node-b", "192.168.0.2"),
            ("node-c", "192.168.0.3"),
        ]
        .into_iter()
        .map(|(name, address)| NetworkPeer {
            name: name.into(),
            address: address.into(),
        })
        .collect();
        self.networks.push((
            NetworkDetails {
                id: id.into(),
                name: name.into(),
                container_addresses: local.iter().map(|a| a.to_string()).collect(),
            },
            peers,
        ));
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_overlay_networks(&self) -> Result<Vec<NetworkSummary>> {
        if self.broken {
            return Err(HealError::transport("docker", "connection refused"));
        }
        Ok(self
            .networks
            .iter()
            .map(|(n, _)| NetworkSummary {
                id: n.id.clone(),
                name: n.name.clone(),
            })
            .collect())
    }

    async fn inspect_network(&self, network_id: &str) -> Result<NetworkDetails> {
        self.networks
            .iter()
            .find(|(n, _)| n.id == network_id)
            .map(|(n, _)| n.clone())
            .ok_or_else(|| HealError::NetworkNotFound(network_id.to_string()))
    }

    async fn network_peers(&self, network_id: &str) -> Result<Vec<NetworkPeer>> {
        self.networks
            .iter()
            .find(|(n, _)| n.id == network_id)
            .map(|(_, peers)| peers.clone())
            .ok_or_else(|| HealError::NetworkNotFound(network_id.to_string()))
    }

    async fn node_address(&self) -> Result<String> {
        Ok(self.node_address.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarCall {
    Delete(TableName, String, String),
    Leave(String),
    Join(String),
}

#[derive(Default)]
pub struct FakeSidecar {
    tables: Mutex<HashMap<(String, TableName), Vec<RawEntry>>>,
    mutations: Mutex<Vec<SidecarCall>>,
    fetches: AtomicUsize,
    fail_mutations: AtomicBool,
}

impl FakeSidecar {
    pub fn set_table(&self, network_id: &str, table: TableName, entries: Vec<RawEntry>) {
        self.tables
            .lock()
            .unwrap()
            .insert((network_id.to_string(), table), entries);
    }

    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn mutations(&self) -> Vec<SidecarCall> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn table_fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn record(&self, call: SidecarCall) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(HealError::transport("diagnostic server", "connection refused"));
        }
        self.mutations.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl DiagnosticSidecar for FakeSidecar {
    async fn get_table(&self, table: TableName, network_id: &str) -> Result<Vec<RawEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(&(network_id.to_string(), table))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_entry(&self, table: TableName, network_id: &str, key: &str) -> Result<()> {
        self.record(SidecarCall::Delete(table, network_id.into(), key.into()))
    }

    async fn leave_network(&self, network_id: &str) -> Result<()> {
        self.record(SidecarCall::Leave(network_id.into()))
    }

    async fn join_network(&self, network_id: &str) -> Result<()> {
        self.record(SidecarCall::Join(network_id.into()))
    }
}

#[derive(Default)]
pub struct FakePeers {
    /// Addresses every peer claims to have a container for.
    bound: BTreeSet<String>,
    unreachable: bool,
    verifications: Mutex<Vec<(String, String, Vec<String>)>>,
    existence_checks: Mutex<Vec<(String, String)>>,
}

impl FakePeers {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_bound(addresses: &[&str]) -> Self {
        Self {
            bound: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn verifications(&self) -> Vec<(String, String, Vec<String>)> {
        self.verifications.lock().unwrap().clone()
    }

    pub fn existence_checks(&self) -> Vec<(String, String)> {
        self.existence_checks.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerClient for FakePeers {
    async fn request_verification(
        &self,
        peer_address: &str,
        network_id: &str,
        candidate_addresses: &[String],
    ) -> Result<()> {
        if self.unreachable {
            return Err(HealError::transport(format!("peer {peer_address}"), "timed out"));
        }
        self.verifications.lock().unwrap().push((
            peer_address.into(),
            network_id.into(),
            candidate_addresses.to_vec(),
        ));
        Ok(())
    }

    async fn has_container_with_address(
        &self,
        peer_address: &str,
        _network_id: &str,
        address: &str,
    ) -> Result<bool> {
        if self.unreachable {
            return Err(HealError::transport(format!("peer {peer_address}"), "timed out"));
        }
        self.existence_checks
            .lock()
            .unwrap()
            .push((peer_address.into(), address.into()));
        Ok(self.bound.contains(address))
    }
}
