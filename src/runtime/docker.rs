use super::{ContainerRuntime, NetworkDetails, NetworkPeer, NetworkSummary};
use crate::error::{HealError, Result};
use crate::types::strip_prefix_len;
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Network};
use bollard::network::{InspectNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tokio::process::Command;

const SIDECAR_CONTAINER_NAME: &str = "netheal-enable-diagnostics";

pub struct DockerRuntime {
    docker: Docker,
    /// Docker CLI used to read overlay peers, which bollard's `Network`
    /// model does not carry.
    cli: String,
}

/// The parts of a raw `docker network inspect` document bollard drops.
#[derive(Debug, Deserialize)]
struct RawNetworkInspect {
    #[serde(rename = "Peers", default)]
    peers: Option<Vec<RawPeer>>,
}

#[derive(Debug, Deserialize)]
struct RawPeer {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "IP")]
    ip: String,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon (unix socket on Linux).
    pub fn connect(cli: impl Into<String>) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            cli: cli.into(),
        })
    }

    /// Run the one-shot container that switches on the daemon's network
    /// diagnostic server, and wait for it to finish.
    pub async fn prepare_diagnostic_sidecar(&self, image: &str) -> Result<()> {
        info!("Pulling {}...", image);
        let mut pull = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            let progress = progress?;
            if let Some(status) = progress.status {
                debug!("Pull {}: {}", image, status);
            }
        }

        // Leftover from a previous crash.
        if self
            .docker
            .remove_container(
                SIDECAR_CONTAINER_NAME,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .is_ok()
        {
            warn!("Removed stale {} container", SIDECAR_CONTAINER_NAME);
        }

        let host_config = HostConfig {
            pid_mode: Some("host".into()),
            network_mode: Some("host".into()),
            privileged: Some(true),
            binds: Some(vec![
                "/etc/docker/daemon.json:/etc/docker/daemon.json".into(),
                "/var/run/docker.sock:/var/run/docker.sock".into(),
            ]),
            ..Default::default()
        };
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: SIDECAR_CONTAINER_NAME,
                    platform: None,
                }),
                ContainerConfig {
                    image: Some(image),
                    host_config: Some(host_config),
                    ..Default::default()
                },
            )
            .await?;

        info!("Starting container to activate network diagnostics server...");
        self.docker
            .start_container(SIDECAR_CONTAINER_NAME, None::<StartContainerOptions<String>>)
            .await?;

        let mut wait = self
            .docker
            .wait_container(SIDECAR_CONTAINER_NAME, None::<WaitContainerOptions<String>>);
        let mut outcome = Ok(());
        while let Some(status) = wait.next().await {
            if let Err(e) = status {
                outcome = Err(HealError::from(e));
                break;
            }
        }

        if let Err(e) = self
            .docker
            .remove_container(
                SIDECAR_CONTAINER_NAME,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            warn!("Failed to remove {}: {}", SIDECAR_CONTAINER_NAME, e);
        }
        outcome
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_overlay_networks(&self) -> Result<Vec<NetworkSummary>> {
        let mut filters = HashMap::new();
        filters.insert("driver", vec!["overlay"]);
        filters.insert("scope", vec!["swarm"]);
        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;

        Ok(networks
            .into_iter()
            .filter(is_swarm_overlay)
            .filter_map(|n| {
                Some(NetworkSummary {
                    id: n.id?,
                    name: n.name.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn inspect_network(&self, network_id: &str) -> Result<NetworkDetails> {
        let network = self
            .docker
            .inspect_network(network_id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => HealError::NetworkNotFound(network_id.to_string()),
                other => HealError::from(other),
            })?;
        Ok(network_details(network_id, network))
    }

    async fn network_peers(&self, network_id: &str) -> Result<Vec<NetworkPeer>> {
        let output = Command::new(&self.cli)
            .args(["network", "inspect", network_id])
            .output()
            .await
            .map_err(|e| HealError::transport("docker cli", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not found") || stderr.contains("No such network") {
                return Err(HealError::NetworkNotFound(network_id.to_string()));
            }
            return Err(HealError::transport("docker cli", stderr.trim()));
        }
        parse_inspect_peers(&output.stdout)
    }

    async fn node_address(&self) -> Result<String> {
        let info = self.docker.info().await?;
        info.swarm
            .and_then(|s| s.node_addr)
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| HealError::transport("docker", "node is not part of a swarm"))
    }
}

fn is_swarm_overlay(network: &Network) -> bool {
    network.scope.as_deref() == Some("swarm") && network.driver.as_deref() == Some("overlay")
}

/// Peers of the first network in a `docker network inspect` array.
/// Networks without tasks on this node carry no `Peers` at all.
fn parse_inspect_peers(raw: &[u8]) -> Result<Vec<NetworkPeer>> {
    let documents: Vec<RawNetworkInspect> = serde_json::from_slice(raw)
        .map_err(|e| HealError::transport("docker cli", format!("bad inspect output: {e}")))?;
    Ok(documents
        .into_iter()
        .next()
        .and_then(|d| d.peers)
        .unwrap_or_default()
        .into_iter()
        .map(|p| NetworkPeer {
            name: p.name,
            address: p.ip,
        })
        .collect())
}

fn network_details(network_id: &str, network: Network) -> NetworkDetails {
    let mut container_addresses = BTreeSet::new();
    for container in network.containers.unwrap_or_default().into_values() {
        for addr in [container.ipv4_address, container.ipv6_address]
            .into_iter()
            .flatten()
        {
            let addr = strip_prefix_len(&addr);
            if !addr.is_empty() {
                container_addresses.insert(addr.to_string());
            }
        }
    }

    NetworkDetails {
        id: network.id.unwrap_or_else(|| network_id.to_string()),
        name: network.name.unwrap_or_default(),
        container_addresses,
    }
}
