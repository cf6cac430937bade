use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::RepairStrategy;

/// Environment variables read on top of the config files.
const ENV_KEYS: [&str; 8] = [
    "check_interval_in_seconds",
    "network_diagnostic_port",
    "port",
    "request_timeout_in_seconds",
    "repair_strategy",
    "diagnostic_sidecar_image",
    "prepare_diagnostic_sidecar",
    "docker_cli",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub check_interval_in_seconds: u64,
    /// Port of the local network diagnostic server.
    pub network_diagnostic_port: u16,
    /// Port of this node's peer RPC listener; peers must use the same one.
    pub port: u16,
    pub request_timeout_in_seconds: u64,
    pub repair_strategy: RepairStrategy,
    pub diagnostic_sidecar_image: String,
    pub prepare_diagnostic_sidecar: bool,
    /// Docker CLI binary, used for network inspection details.
    pub docker_cli: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_in_seconds: 60,
            network_diagnostic_port: 2000,
            port: 3175,
            request_timeout_in_seconds: 10,
            repair_strategy: RepairStrategy::Targeted,
            diagnostic_sidecar_image: "sovarto/enable-docker-network-diagnostic-server:1.0.0"
                .into(),
            prepare_diagnostic_sidecar: true,
            docker_cli: "docker".into(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("netheal.toml"))
                .merge(Json::file("netheal.json"))
                .merge(Env::raw().only(&ENV_KEYS)),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.check_interval_in_seconds == 0 {
            anyhow::bail!("CHECK_INTERVAL_IN_SECONDS must be greater than zero");
        }
        Ok(config)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_in_seconds)
    }

    /// Per-call timeout, kept strictly below the check interval.
    pub fn request_timeout(&self) -> Duration {
        let timeout = self
            .request_timeout_in_seconds
            .clamp(1, self.check_interval_in_seconds.saturating_sub(1).max(1));
        Duration::from_secs(timeout)
    }

    pub fn diagnostic_base_url(&self) -> String {
        format!("http://localhost:{}", self.network_diagnostic_port)
    }
}
