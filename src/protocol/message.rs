use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Address, CorrelationId, Result};

/// Reply-type tag used for a call's final answer.
pub const REPLY_TYPE_CALLBACK: &str = "callback";

/// Outbound request: invoke `method` on the target with positional `args`,
/// and send replies tagged with `corrID` to `replyTo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,

    #[serde(default)]
    pub args: Vec<Value>,

    #[serde(rename = "corrID")]
    pub corr_id: CorrelationId,

    #[serde(rename = "replyTo")]
    pub reply_to: Address,
}

impl RpcRequest {
    pub fn encode(&self) -> Result<Bytes> {
        // ---
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        // ---
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Inbound reply: resolve call `corrID` through the callback registered
/// under `type`, passing `data` and `err` through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    #[serde(rename = "corrID")]
    pub corr_id: CorrelationId,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<Value>,
}

impl RpcReply {
    /// A successful final reply.
    pub fn callback(corr_id: CorrelationId, data: Value) -> Self {
        // ---
        Self {
            corr_id,
            kind: REPLY_TYPE_CALLBACK.to_string(),
            data: Some(data),
            err: None,
        }
    }

    /// A final reply carrying a remote error.
    pub fn error(corr_id: CorrelationId, err: Value) -> Self {
        // ---
        Self {
            corr_id,
            kind: REPLY_TYPE_CALLBACK.to_string(),
            data: None,
            err: Some(err),
        }
    }

    /// Re-tag the reply with a caller-registered reply type.
    ///
    /// Whatever the tag, the reply ends the call: it is the call's one
    /// terminal event.
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn encode(&self) -> Result<Bytes> {
        // ---
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        // ---
        Ok(serde_json::from_slice(payload)?)
    }
}
