//! Peer coordination over the symmetric node-to-node HTTP RPC.
//!
//! Every node runs the same listener on the same port, so a peer is
//! reached at `http://{peer_address}:{port}`.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{HealError, Result};

/// Body of `POST /rejoin-if-necessary/{network_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub endpoint_ips: Vec<String>,
}

#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Ask a peer to check its own claims on `candidate_addresses` and fix
    /// them if stale.  Returns once the request was delivered; the remote
    /// outcome is never reported back.
    async fn request_verification(
        &self,
        peer_address: &str,
        network_id: &str,
        candidate_addresses: &[String],
    ) -> Result<()>;

    /// Ask a peer whether it has a live container bound to `address`.
    async fn has_container_with_address(
        &self,
        peer_address: &str,
        network_id: &str,
        address: &str,
    ) -> Result<bool>;
}

pub struct HttpPeerClient {
    client: reqwest::Client,
    port: u16,
}

impl HttpPeerClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| HealError::transport("peer client", e))?;
        Ok(Self {
            client,
            port: cfg.port,
        })
    }

    fn url(&self, peer_address: &str, path: &str) -> String {
        if peer_address.contains(':') && !peer_address.starts_with('[') {
            format!("http://[{}]:{}{}", peer_address, self.port, path)
        } else {
            format!("http://{}:{}{}", peer_address, self.port, path)
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn request_verification(
        &self,
        peer_address: &str,
        network_id: &str,
        candidate_addresses: &[String],
    ) -> Result<()> {
        let url = self.url(peer_address, &format!("/rejoin-if-necessary/{network_id}"));
        let body = VerificationRequest {
            endpoint_ips: candidate_addresses.to_vec(),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HealError::transport(format!("peer {peer_address}"), e))?;
        if !response.status().is_success() {
            return Err(HealError::transport(
                format!("peer {peer_address}"),
                format!("verification request answered {}", response.status()),
            ));
        }
        debug!("Delivered verification request to {}", peer_address);
        Ok(())
    }

    async fn has_container_with_address(
        &self,
        peer_address: &str,
        network_id: &str,
        address: &str,
    ) -> Result<bool> {
        let url = self.url(
            peer_address,
            &format!("/networks/{network_id}/has-container-with-ip/{address}"),
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HealError::transport(format!("peer {peer_address}"), e))?;
        interpret_existence_status(response.status())
            .map_err(|reason| HealError::transport(format!("peer {peer_address}"), reason))
    }
}

fn interpret_existence_status(status: StatusCode) -> std::result::Result<bool, String> {
    match status {
        StatusCode::NO_CONTENT => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        other => Err(format!("existence check answered {other}")),
    }
}
