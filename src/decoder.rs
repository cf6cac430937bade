//! Table decoding: raw dump entries to typed [`TableEntry`] records.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use prost::Message;

use crate::error::{HealError, Result};
use crate::records::{EndpointRecord, PeerRecord};
use crate::sidecar::{DiagnosticSidecar, RawEntry};
use crate::types::{strip_prefix_len, TableEntry, TableName};

/// Fetch and decode a table.  The name is validated before any request
/// goes out.
pub async fn fetch_table(
    sidecar: &dyn DiagnosticSidecar,
    table_name: &str,
    network_id: &str,
) -> Result<Vec<TableEntry>> {
    let table: TableName = table_name.parse()?;
    let raw = sidecar.get_table(table, network_id).await?;
    decode_entries(table, &raw)
}

/// Decode every entry of a dump.  The first corrupt record fails the
/// whole table.
pub fn decode_entries(table: TableName, raw: &[RawEntry]) -> Result<Vec<TableEntry>> {
    raw.iter().map(|entry| decode_entry(table, entry)).collect()
}

fn decode_entry(table: TableName, entry: &RawEntry) -> Result<TableEntry> {
    let failure = |reason: String| HealError::DecodeFailure {
        table: table.to_string(),
        key: entry.key.clone(),
        reason,
    };

    let bytes = STANDARD
        .decode(entry.value.trim())
        .map_err(|e| failure(format!("invalid base64: {e}")))?;

    let address = match table {
        TableName::EndpointTable => {
            EndpointRecord::decode(bytes.as_slice())
                .map_err(|e| failure(e.to_string()))?
                .endpoint_ip
        }
        TableName::OverlayPeerTable => {
            PeerRecord::decode(bytes.as_slice())
                .map_err(|e| failure(e.to_string()))?
                .endpoint_ip
        }
    };

    Ok(TableEntry {
        key: entry.key.clone(),
        owner: entry.owner.clone(),
        table,
        decoded_address: strip_prefix_len(&address).to_string(),
    })
}
