use std::time::Duration;

use thiserror::Error;

use crate::CorrelationId;

/// Errors surfaced by the RPC layer.
///
/// Terminal call errors (`ClientNotReady`, `Timeout`, `UnknownReplyType`) are
/// delivered through the call's callbacks rather than returned, so the type is
/// `Clone` and a single error can be fanned out to every registered tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The transport has no reply channel yet, or the client was disconnected.
    #[error("rpc client not ready")]
    ClientNotReady,

    /// No reply arrived before the call's deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A reply carried a `type` tag the call never registered a callback for.
    #[error("reply {id} has unknown type tag: {tag}")]
    UnknownReplyType { id: CorrelationId, tag: String },

    /// A correlation id was registered twice.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(CorrelationId),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport-level failure (publish, subscribe, close).
    #[error("transport error: {0}")]
    Transport(String),

    /// A request named a method nobody registered.
    #[error("no handler registered for method: {0}")]
    NoHandler(String),
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        // ---
        RpcError::Serialization(err.to_string())
    }
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
