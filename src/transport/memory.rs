//! In-memory transport implementation.
//!
//! A pure in-process stand-in for a message broker. It is the reference for
//! transport semantics and the backbone of the crate's tests:
//!
//! - Once `subscribe()` returns successfully, messages published *after* that
//!   point and matching the subscription are deliverable.
//! - Matching is exact string equality between address and subscription.
//! - Every matching subscriber receives its own copy (fan-out).
//! - Delivery is deterministic within a single process.
//!
//! The hub also carries a readiness flag so tests can model a broker
//! connection that has not come up yet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    Envelope,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};

/// Shared message bus for the in-memory transport.
///
/// All `MemoryTransport` instances sharing a hub see each other's messages,
/// exactly as nodes connected to one broker would. Construct a hub per test
/// to keep parallel tests isolated.
///
/// ```
/// # use mom_rpc_callbacks::{MemoryHub, RpcConfig};
/// # async fn example() -> mom_rpc_callbacks::Result<()> {
/// let hub = MemoryHub::new();
/// let server = mom_rpc_callbacks::create_memory_transport_with_hub(&RpcConfig::new("nodeA"), hub.clone()).await?;
/// let client = mom_rpc_callbacks::create_memory_transport_with_hub(&RpcConfig::new("portal"), hub.clone()).await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Subscription, Vec<mpsc::Sender<Envelope>>>>,
    ready: AtomicBool,
}

impl MemoryHub {
    /// Create a new, empty hub that reports ready.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    /// Flip the hub's readiness, simulating broker connect/disconnect.
    pub fn set_ready(&self, ready: bool) {
        // ---
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn publish(&self, transport_id: &str, env: Envelope) -> Result<()> {
        // ---
        if !self.is_ready() {
            return Err(RpcError::Transport(format!(
                "{transport_id}: hub not ready, dropping message to {}",
                env.address
            )));
        }

        let subs = self.subscriptions.read().await;

        let Some(senders) = subs.get(&Subscription::from(env.address.clone())) else {
            log_debug!("{transport_id}: no subscriber for {}", env.address);
            return Ok(());
        };

        for sender in senders {
            // A closed channel means the SubscriptionHandle was dropped.
            if sender.send(env.clone()).await.is_err() {
                log_debug!("{transport_id}: subscriber for {} went away", env.address);
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        transport_id: &str,
        sub: Subscription,
        capacity: usize,
    ) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{transport_id}: subscribe to {sub:?}");

        let (tx, rx) = mpsc::channel(capacity);

        let mut subs = self.subscriptions.write().await;
        let senders = subs.entry(sub).or_default();
        senders.retain(|s| !s.is_closed());
        senders.push(tx);

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self, transport_id: &str) -> Result<()> {
        // ---
        log_debug!("{transport_id}: closing transport, clearing hub");

        let mut subs = self.subscriptions.write().await;
        subs.clear();
        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(true),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

struct MemoryTransport {
    // ---
    transport_id: String,
    capacity: usize,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    fn is_ready(&self) -> bool {
        self.hub.is_ready()
    }

    async fn publish(&self, env: Envelope) -> Result<()> {
        self.hub.publish(&self.transport_id, env).await
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        self.hub
            .subscribe(&self.transport_id, sub, self.capacity)
            .await
    }

    /// Clears every subscription on the hub, including those of other
    /// transports sharing it. Use a per-test hub to avoid surprises.
    async fn close(&self) -> Result<()> {
        self.hub.close(&self.transport_id).await
    }
}

/// Create an in-memory transport on the process-global hub.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport(config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create an in-memory transport on the given hub.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport_with_hub(
    config: &RpcConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create memory transport", config.node_id);

    Ok(Arc::new(MemoryTransport {
        transport_id: config.node_id.clone(),
        capacity: config.inbox_capacity,
        hub,
    }))
}
