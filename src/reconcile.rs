//! Reconciliation loop.
//!
//! One pass walks every swarm overlay network and both gossip tables in
//! turn, strictly sequentially.  Errors are contained at the smallest unit
//! that can be retried on the next pass: an owner's claim, a table, a
//! network.  The loop itself never stops.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::coordinator::PeerClient;
use crate::decoder::fetch_table;
use crate::detector::detect_conflicts;
use crate::error::{HealError, Result};
use crate::policy::decide;
use crate::runtime::{ContainerRuntime, NetworkSummary};
use crate::sidecar::DiagnosticSidecar;
use crate::types::{NetworkContext, RepairAction, RepairStrategy, TableName};

/// Counters of one pass, logged when it completes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub networks_checked: usize,
    pub networks_skipped: usize,
    pub tables_failed: usize,
    pub conflicts: usize,
    pub actions_executed: usize,
    pub actions_failed: usize,
}

pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    sidecar: Arc<dyn DiagnosticSidecar>,
    peers: Arc<dyn PeerClient>,
    strategy: RepairStrategy,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        sidecar: Arc<dyn DiagnosticSidecar>,
        peers: Arc<dyn PeerClient>,
        strategy: RepairStrategy,
        interval: Duration,
    ) -> Self {
        Self {
            runtime,
            sidecar,
            peers,
            strategy,
            interval,
        }
    }

    /// Run passes forever.  The next pass starts `interval` after the
    /// previous one finished, so passes never overlap.
    pub async fn run(&self) {
        loop {
            match self.run_pass().await {
                Ok(report) => info!(
                    "Done ({:?}). Checking again in {} seconds.",
                    report,
                    self.interval.as_secs()
                ),
                Err(e) => error!(
                    "Error checking tables: {}. Retrying in {} seconds.",
                    e,
                    self.interval.as_secs()
                ),
            }
            sleep(self.interval).await;
        }
    }

    /// One pass over every relevant network.
    pub async fn run_pass(&self) -> Result<PassReport> {
        info!("Checking tables...");
        let mut report = PassReport::default();
        let networks = self.runtime.list_overlay_networks().await?;
        let node_address = self.runtime.node_address().await?;

        for network in networks {
            info!("...for network {} ({})", network.name, network.id);
            let resolved = resolve_context(self.runtime.as_ref(), &network, &node_address).await;
            let ctx = match resolved {
                Ok(ctx) => ctx,
                Err(HealError::IdentityUnresolved(_)) => {
                    warn!(
                        "Couldn't determine own peer name for network {}, probably no containers on this node participate in it. Skipping network.",
                        network.name
                    );
                    report.networks_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to inspect network {}: {}. Skipping network.", network.name, e);
                    report.networks_skipped += 1;
                    continue;
                }
            };
            report.networks_checked += 1;
            self.check_network(&ctx, &mut report).await;
        }
        Ok(report)
    }

    async fn check_network(&self, ctx: &NetworkContext, report: &mut PassReport) {
        let mut rejoined = false;
        for table in TableName::ALL {
            let fetched =
                fetch_table(self.sidecar.as_ref(), table.as_str(), &ctx.network_id).await;
            let entries = match fetched {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Skipping table '{}' on network {}: {}",
                        table, ctx.network_name, e
                    );
                    report.tables_failed += 1;
                    continue;
                }
            };

            let groups = detect_conflicts(&entries);
            if groups.is_empty() {
                info!("Found no invalid entries in table '{}'.", table);
                continue;
            }
            info!(
                "Found {} invalid entries in table '{}'.",
                groups.len(),
                table
            );
            report.conflicts += groups.len();

            for group in &groups {
                debug!("Conflict on {}: {:?}", group.address, group.owners_to_keys);
                for action in decide(self.strategy, table, ctx, group) {
                    if let RepairAction::RejoinNetwork { .. } = action {
                        if rejoined {
                            continue;
                        }
                        rejoined = true;
                    }
                    match execute_action(
                        &action,
                        &group.address,
                        self.sidecar.as_ref(),
                        self.peers.as_ref(),
                    )
                    .await
                    {
                        Ok(()) => report.actions_executed += 1,
                        Err(e) => {
                            warn!(
                                "Error while repairing entry for IP {} ({:?}): {}",
                                group.address, action, e
                            );
                            report.actions_failed += 1;
                        }
                    }
                }
            }
        }
    }
}

/// Build the per-network facts for this pass.  Fails with
/// `IdentityUnresolved` when `node_address` is not among the peers.
pub async fn resolve_context(
    runtime: &dyn ContainerRuntime,
    network: &NetworkSummary,
    node_address: &str,
) -> Result<NetworkContext> {
    let details = runtime.inspect_network(&network.id).await?;
    let peers = runtime.network_peers(&network.id).await?;
    let own_peer_name = peers
        .iter()
        .find(|p| p.address == node_address)
        .map(|p| p.name.clone())
        .ok_or_else(|| HealError::IdentityUnresolved(details.name.clone()))?;
    debug!("Own peer name on {}: {}", details.name, own_peer_name);

    Ok(NetworkContext {
        network_id: network.id.clone(),
        network_name: details.name,
        own_peer_name: Some(own_peer_name),
        peer_name_to_address: peers
            .into_iter()
            .map(|p| (p.name, p.address))
            .collect(),
        local_container_addresses: details.container_addresses,
    })
}

/// Carry out one repair action.  `address` is only used for logging.
pub async fn execute_action(
    action: &RepairAction,
    address: &str,
    sidecar: &dyn DiagnosticSidecar,
    peers: &dyn PeerClient,
) -> Result<()> {
    match action {
        RepairAction::DeleteEntries {
            table,
            network_id,
            keys,
        } => {
            for key in keys {
                info!(
                    "Deleting invalid entry for IP {} with key {} owned by us...",
                    address, key
                );
                sidecar.delete_entry(*table, network_id, key).await?;
            }
        }
        RepairAction::RequestPeerVerification {
            peer_address,
            network_id,
            candidate_addresses,
        } => {
            info!(
                "Asking peer {} to verify its claim on {:?}",
                peer_address, candidate_addresses
            );
            peers
                .request_verification(peer_address, network_id, candidate_addresses)
                .await?;
        }
        RepairAction::CorroboratePeerClaim {
            peer_address,
            network_id,
            table,
            address,
            keys,
        } => {
            if peers
                .has_container_with_address(peer_address, network_id, address)
                .await?
            {
                debug!("Peer {} confirmed its claim on {}", peer_address, address);
                return Ok(());
            }
            for key in keys {
                info!(
                    "Deleting invalid entry for IP {} with key {} owned by peer {}...",
                    address, key, peer_address
                );
                sidecar.delete_entry(*table, network_id, key).await?;
            }
        }
        RepairAction::RejoinNetwork { network_id } => {
            info!("Leaving and re-joining network {}...", network_id);
            sidecar.leave_network(network_id).await?;
            sidecar.join_network(network_id).await?;
        }
    }
    Ok(())
}
