use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors surfaced by the signaling crate.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("invalid room URL '{0}': only ws:// and wss:// are supported")]
    InvalidRoomUrl(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("room server POST failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("room server POST task failed: {0}")]
    HttpTask(#[from] tokio::task::JoinError),

    #[error("room server POST returned malformed JSON: {0}")]
    PostJson(#[from] serde_json::Error),

    #[error("room server POST rejected: {0}")]
    PostRejected(String),
}
