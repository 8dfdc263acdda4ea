// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! The transport is the only collaborator the RPC layer talks to. It delivers
//! opaque envelopes to subscribers and answers one question, "can I publish
//! yet?". Correlation, timeouts and callback routing are handled above it.
//!
//! Concrete implementations live under `src/transport/`.
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// A transport address.
///
/// Interpretation is transport-specific (AMQP routing key, MQTT topic, queue
/// name). The RPC layer treats it as opaque: a target node's address for
/// requests, a private reply address for replies.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Address(pub Arc<str>);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subscription identifier.
///
/// Matching rules are defined by each transport; the in-memory transport
/// matches on exact string equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub Arc<str>);

impl From<Address> for Subscription {
    fn from(address: Address) -> Self {
        // ---
        Subscription(address.0)
    }
}

impl<T> From<T> for Subscription
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Subscription(value.into())
    }
}

/// An opaque message envelope.
///
/// The transport reads only `address`; `payload` carries a JSON-encoded
/// [`RpcRequest`](crate::RpcRequest) or [`RpcReply`](crate::RpcReply).
///
/// # Example
///
/// ```
/// # use mom_rpc_callbacks::{Envelope, Address};
/// # use bytes::Bytes;
/// let envelope = Envelope::json(
///     Address::from("nodeA"),
///     Bytes::from_static(br#"{"method":"getStatus","args":[],"corrID":1,"replyTo":"r"}"#),
/// );
/// assert_eq!(envelope.address.as_str(), "nodeA");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    // ---
    /// Delivery address used by the transport.
    pub address: Address,

    /// Opaque payload bytes.
    pub payload: Bytes,

    /// Optional content type metadata (e.g. "application/json").
    pub content_type: Option<Arc<str>>,
}

impl Envelope {
    /// Create an envelope carrying a JSON payload.
    pub fn json(address: Address, payload: Bytes) -> Self {
        // ---
        Self {
            address,
            payload,
            content_type: Some(Arc::from("application/json")),
        }
    }
}

/// Handle returned from a successful subscription.
///
/// Dropping the handle unsubscribes; the transport notices the closed channel
/// on its next publish.
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for delivered envelopes matching this subscription.
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after* that
///   point and matching the subscription are deliverable.
/// - `publish()` is best-effort; failures are reported but never retried here.
/// - `is_ready()` is cheap and never blocks.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Identifier of this transport instance, used for logging.
    fn transport_id(&self) -> &str;

    /// Whether the transport can currently publish.
    ///
    /// Defaults to `true` for transports that are connected on construction.
    fn is_ready(&self) -> bool {
        true
    }

    /// Publish an envelope to `env.address`.
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Register a subscription and return a handle for receiving messages.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// Cheap to clone; all clones share the same underlying connection.
pub type TransportPtr = Arc<dyn Transport>;
