//! Inbound peer RPC and liveness listener.
//!
//! * `GET /networks/{nid}/has-container-with-ip/{address}`: `204` if a
//!   local container is bound to the address on that network, else `404`.
//! * `POST /rejoin-if-necessary/{nid}` with `{"endpointIps": [...]}`:
//!   checks this node's own claims on those addresses and repairs them
//!   locally if none is backed by a container.  The outcome is logged, not
//!   returned.
//! * `GET /health`: liveness.
//!
//! Handlers may run concurrently with a reconciliation pass; they only
//! read from the runtime and repair claims owned by this node.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use log::{error, info, warn};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::coordinator::PeerClient;
use crate::decoder::fetch_table;
use crate::error::HealError;
use crate::policy::verify_local_claims;
use crate::reconcile::{execute_action, resolve_context};
use crate::runtime::{ContainerRuntime, NetworkSummary};
use crate::sidecar::DiagnosticSidecar;
use crate::types::{strip_prefix_len, RepairAction, RepairStrategy, TableName};

#[derive(Clone)]
pub struct ServerState {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub sidecar: Arc<dyn DiagnosticSidecar>,
    pub peers: Arc<dyn PeerClient>,
    pub strategy: RepairStrategy,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/networks/:network_id/has-container-with-ip/:address",
            get(has_container_with_ip),
        )
        .route("/rejoin-if-necessary/:network_id", post(rejoin_if_necessary))
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn run_server(port: u16, state: ServerState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Server running on port {}", port);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn has_container_with_ip(
    State(state): State<ServerState>,
    Path((network_id, address)): Path<(String, String)>,
) -> StatusCode {
    match state.runtime.inspect_network(&network_id).await {
        Ok(details) if details.container_addresses.contains(strip_prefix_len(&address)) => {
            StatusCode::NO_CONTENT
        }
        Ok(_) => StatusCode::NOT_FOUND,
        // No task on this node means the network is not set up here.
        Err(HealError::NetworkNotFound(_)) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!("Failed to inspect network {}: {}", network_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn rejoin_if_necessary(
    State(state): State<ServerState>,
    Path(network_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    let Some(candidates) = parse_endpoint_ips(&body) else {
        return StatusCode::BAD_REQUEST;
    };

    let network = NetworkSummary {
        id: network_id.clone(),
        name: network_id.clone(),
    };
    let node_address = match state.runtime.node_address().await {
        Ok(address) => address,
        Err(e) => {
            error!("Failed to read the node address: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    let ctx = match resolve_context(state.runtime.as_ref(), &network, &node_address).await {
        Ok(ctx) => ctx,
        Err(HealError::NetworkNotFound(_)) | Err(HealError::IdentityUnresolved(_)) => {
            info!(
                "Peer asked to verify {:?} on {}, but this node has no workload there",
                candidates, network_id
            );
            return StatusCode::NO_CONTENT;
        }
        Err(e) => {
            error!("Failed to inspect network {}: {}", network_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let address = candidates.join(", ");
    let mut rejoined = false;
    for table in TableName::ALL {
        let entries = match fetch_table(state.sidecar.as_ref(), table.as_str(), &network_id).await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping table '{}' on network {}: {}", table, network_id, e);
                continue;
            }
        };
        let Some(action) =
            verify_local_claims(state.strategy, table, &ctx, &candidates, &entries)
        else {
            continue;
        };
        if let RepairAction::RejoinNetwork { .. } = action {
            if rejoined {
                continue;
            }
            rejoined = true;
        }

        info!("No local container for {} on {}, repairing", address, network_id);
        if let Err(e) = execute_action(
            &action,
            &address,
            state.sidecar.as_ref(),
            state.peers.as_ref(),
        )
        .await
        {
            warn!("Local repair of {} on {} failed: {}", address, network_id, e);
        }
    }
    StatusCode::NO_CONTENT
}

/// `endpointIps` must be an array of strings.
fn parse_endpoint_ips(body: &[u8]) -> Option<Vec<String>> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("endpointIps")?
        .as_array()?
        .iter()
        .map(|ip| ip.as_str().map(|s| strip_prefix_len(s).to_string()))
        .collect()
}
