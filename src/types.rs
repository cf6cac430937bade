//! Pass-scoped value types used throughout the healer.
//!
//! Everything here is rebuilt from scratch on every reconciliation pass
//! and dropped at its end.  Nothing is shared between passes or written
//! to disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HealError;

/// The two gossip tables the healer knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    EndpointTable,
    OverlayPeerTable,
}

impl TableName {
    /// Tables checked on every pass, in processing order.
    pub const ALL: [TableName; 2] = [TableName::EndpointTable, TableName::OverlayPeerTable];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::EndpointTable => "endpoint_table",
            TableName::OverlayPeerTable => "overlay_peer_table",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = HealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "endpoint_table" => Ok(TableName::EndpointTable),
            "overlay_peer_table" => Ok(TableName::OverlayPeerTable),
            other => Err(HealError::UnsupportedTable(other.to_string())),
        }
    }
}

/// One decoded gossip record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub key: String,
    pub owner: String,
    pub table: TableName,
    /// Target address with any `/prefix` suffix removed.
    pub decoded_address: String,
}

/// All entries of one (network, table) that point at the same address.
///
/// Owners are kept sorted by name, keys in the order they appeared in the
/// dump.  Duplicate keys are kept since each one must be repairable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    pub address: String,
    pub owners_to_keys: BTreeMap<String, Vec<String>>,
}

impl ConflictGroup {
    /// More than one owner claims the address.
    pub fn is_invalid(&self) -> bool {
        self.owners_to_keys.len() > 1
    }
}

/// Facts about one network gathered once per pass.
#[derive(Debug, Clone, Default)]
pub struct NetworkContext {
    pub network_id: String,
    pub network_name: String,
    /// `None` when this node has no workload on the network.
    pub own_peer_name: Option<String>,
    pub peer_name_to_address: BTreeMap<String, String>,
    pub local_container_addresses: BTreeSet<String>,
}

/// The decided outcome for one (group, owner) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Delete the given keys from the local sidecar.
    DeleteEntries {
        table: TableName,
        network_id: String,
        keys: Vec<String>,
    },
    /// Ask the owning peer to check its own claim; fire-and-forget.
    RequestPeerVerification {
        peer_address: String,
        network_id: String,
        candidate_addresses: Vec<String>,
    },
    /// Ask the owning peer whether it still has the container and delete
    /// the keys locally if it says no.
    CorroboratePeerClaim {
        peer_address: String,
        network_id: String,
        table: TableName,
        address: String,
        keys: Vec<String>,
    },
    /// Leave and re-join the network through the sidecar.
    RejoinNetwork { network_id: String },
}

/// How stale claims are repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairStrategy {
    /// Delete own stale entries, ask owners to verify theirs.
    #[default]
    Targeted,
    /// Delete own stale entries, delete peers' entries the owner denies.
    Corroborate,
    /// Leave and re-join the network on an own stale claim.
    Rejoin,
}

/// Strip a CIDR suffix, `10.0.0.5/24` becomes `10.0.0.5`.
pub fn strip_prefix_len(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}
