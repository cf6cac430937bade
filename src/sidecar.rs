//! Client for the local network diagnostic server.
//!
//! The diagnostic server exposes raw gossip table dumps and a handful of
//! repair primitives over plain HTTP on localhost.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{HealError, Result};
use crate::types::TableName;

/// One raw entry of a table dump, value still base64-encoded.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub value: String,
    pub owner: String,
}

#[derive(Debug, Deserialize)]
struct GetTableResponse {
    details: Option<TableDetails>,
}

#[derive(Debug, Deserialize)]
struct TableDetails {
    #[serde(default)]
    entries: Option<Vec<RawEntry>>,
}

#[async_trait]
pub trait DiagnosticSidecar: Send + Sync {
    /// Dump the current contents of a table on a network.
    async fn get_table(&self, table: TableName, network_id: &str) -> Result<Vec<RawEntry>>;

    /// Delete a single entry.
    async fn delete_entry(&self, table: TableName, network_id: &str, key: &str) -> Result<()>;

    async fn leave_network(&self, network_id: &str) -> Result<()>;

    async fn join_network(&self, network_id: &str) -> Result<()>;
}

pub struct HttpSidecar {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSidecar {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| HealError::transport("diagnostic server", e))?;
        Ok(Self::with_client(client, cfg.diagnostic_base_url()))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn call(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| HealError::transport("diagnostic server", e))?;
        if !response.status().is_success() {
            return Err(HealError::transport(
                "diagnostic server",
                format!("{} answered {}", path, response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl DiagnosticSidecar for HttpSidecar {
    async fn get_table(&self, table: TableName, network_id: &str) -> Result<Vec<RawEntry>> {
        // The diagnostic server switches to JSON output on a bare `json` flag.
        let url = format!(
            "{}/gettable?nid={}&tname={}&json",
            self.base_url, network_id, table
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HealError::transport("diagnostic server", e))?;
        if !response.status().is_success() {
            return Err(HealError::transport(
                "diagnostic server",
                format!("/gettable answered {}", response.status()),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| HealError::transport("diagnostic server", e))?;
        debug!("Dump of {} on {}: {}", table, network_id, body);
        parse_table_dump(&body)
    }

    async fn delete_entry(&self, table: TableName, network_id: &str, key: &str) -> Result<()> {
        self.call(
            "/deleteentry",
            &[("tname", table.as_str()), ("nid", network_id), ("key", key)],
        )
        .await?;
        Ok(())
    }

    async fn leave_network(&self, network_id: &str) -> Result<()> {
        self.call("/leavenetwork", &[("nid", network_id)]).await?;
        Ok(())
    }

    async fn join_network(&self, network_id: &str) -> Result<()> {
        self.call("/joinnetwork", &[("nid", network_id)]).await?;
        Ok(())
    }
}

/// Extract the entries of a `/gettable` JSON body.  A missing or empty
/// entry list is an empty table.
pub fn parse_table_dump(body: &str) -> Result<Vec<RawEntry>> {
    let parsed: GetTableResponse = serde_json::from_str(body)
        .map_err(|e| HealError::transport("diagnostic server", format!("bad table dump: {e}")))?;
    Ok(parsed
        .details
        .and_then(|d| d.entries)
        .unwrap_or_default())
}
