//! Error taxonomy shared by the decoder, the repair path and the peer RPC.
//!
//! Every variant is recoverable at some unit of work: a decode call, a
//! table, a network or a single owner's claim.  Nothing here is fatal to
//! the reconciliation loop itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealError {
    /// A table name outside `endpoint_table` / `overlay_peer_table`.
    #[error("unsupported table '{0}'")]
    UnsupportedTable(String),

    /// A record value that is not valid base64 or not a valid record.
    #[error("failed to decode entry '{key}' of table '{table}': {reason}")]
    DecodeFailure {
        table: String,
        key: String,
        reason: String,
    },

    /// The sidecar, a peer or the runtime API could not be reached or
    /// answered with an unexpected status.
    #[error("{target} unreachable: {reason}")]
    TransportFailure { target: String, reason: String },

    /// The runtime does not know the network on this node.
    #[error("network '{0}' not found")]
    NetworkNotFound(String),

    /// This node has no peer identity on the network.
    #[error("own peer identity on network '{0}' could not be resolved")]
    IdentityUnresolved(String),

    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
}

impl HealError {
    pub fn transport(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::TransportFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HealError>;
