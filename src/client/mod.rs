//! RPC client: issue calls and route replies to per-call callbacks.
mod callbacks;
mod dispatcher;
mod pending;

pub use callbacks::{CallResult, Callbacks, Reply};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::protocol::RpcRequest;
use crate::transport::runner;
use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    Address,
    CorrelationId,
    Envelope,
    IdAllocator,
    Result,
    RpcConfig,
    RpcError,
    TransportPtr,
};
use dispatcher::ReplyDispatcher;
use pending::PendingCalls;

/// Correlation engine for callback-style RPC over a message broker.
///
/// One instance owns one private reply channel, one id counter and one
/// pending-call table; nothing is process-global, so several clients can
/// share a transport or use separate ones. Create it with
/// [`connect`](Self::connect) once the transport is up and call
/// [`disconnect`](Self::disconnect) (or drop every clone) when it goes away.
///
/// Every call issued through [`call_rpc`](Self::call_rpc) ends in exactly one
/// terminal event: a matching reply, a timeout, or an immediate
/// [`RpcError::ClientNotReady`].
///
/// # Example
///
/// ```no_run
/// use mom_rpc_callbacks::{create_memory_transport, Callbacks, RpcClient, RpcConfig};
/// use std::time::Duration;
///
/// # async fn example() -> mom_rpc_callbacks::Result<()> {
/// let config = RpcConfig::new("portal");
/// let transport = create_memory_transport(&config).await?;
/// let client = RpcClient::connect(transport, config).await?;
///
/// client
///     .call_rpc(
///         "nodeA",
///         "getStatus",
///         vec![],
///         Callbacks::callback(|result| println!("status: {result:?}")),
///         Some(Duration::from_millis(500)),
///     )
///     .await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    config: RpcConfig,
    reply_to: Address,
    ids: IdAllocator,
    pending: Arc<PendingCalls>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    /// Create a client without subscribing to its reply channel.
    ///
    /// Until [`listen`](Self::listen) succeeds the client is not ready and
    /// every call fails immediately with [`RpcError::ClientNotReady`].
    pub fn new(transport: TransportPtr, config: RpcConfig) -> Self {
        // ---
        let reply_to = Address::from(format!(
            "{}.{}.{}",
            config.reply_prefix,
            config.node_id,
            Uuid::new_v4()
        ));

        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                reply_to,
                ids: IdAllocator::new(),
                pending: PendingCalls::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Create a client and subscribe its reply channel.
    ///
    /// # Errors
    ///
    /// Fails if the transport refuses the subscription.
    pub async fn connect(transport: TransportPtr, config: RpcConfig) -> Result<Self> {
        // ---
        let client = Self::new(transport, config);
        client.listen().await?;
        Ok(client)
    }

    /// Subscribe the private reply channel and start dispatching replies.
    ///
    /// Calling it again while the listener is running is a no-op. A listener
    /// that has stopped (its inbox was closed) is replaced.
    ///
    /// # Errors
    ///
    /// Fails if the transport refuses the subscription.
    pub async fn listen(&self) -> Result<()> {
        // ---
        if self.listener_alive() {
            return Ok(());
        }

        let dispatcher =
            ReplyDispatcher::new(self.inner.reply_to.clone(), self.inner.pending.clone());
        let join = runner::run(self.inner.transport.clone(), dispatcher).await?;

        let previous = lock_ignore_poison(&self.inner.listener).replace(join);
        if let Some(previous) = previous {
            previous.abort();
        }

        log_info!(
            "{}: listening for replies on {}",
            self.inner.config.node_id,
            self.inner.reply_to
        );
        Ok(())
    }

    /// Stop the reply listener and mark the client not ready.
    ///
    /// Calls already in flight are not cancelled; with no listener left they
    /// resolve through their timeouts. The transport itself is left open, it
    /// belongs to whoever created it.
    pub fn disconnect(&self) {
        // ---
        if let Some(join) = lock_ignore_poison(&self.inner.listener).take() {
            join.abort();
        }
        log_info!(
            "{}: disconnected, {} call(s) left to time out",
            self.inner.config.node_id,
            self.inner.pending.len()
        );
    }

    /// Whether a call issued now would be sent and its reply dispatched.
    ///
    /// False before [`listen`](Self::listen), after
    /// [`disconnect`](Self::disconnect), once the reply listener has stopped,
    /// or while the transport reports not ready.
    pub fn is_ready(&self) -> bool {
        self.listener_alive() && self.inner.transport.is_ready()
    }

    fn listener_alive(&self) -> bool {
        lock_ignore_poison(&self.inner.listener)
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }

    /// Address peers must reply to.
    pub fn reply_address(&self) -> &Address {
        &self.inner.reply_to
    }

    /// Number of calls still waiting for a reply or timeout.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether call `id` is still outstanding.
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.inner.pending.contains(id)
    }

    /// Call `method` on the peer at `to`, without waiting for the reply.
    ///
    /// `callbacks` fixes the reply tags this call accepts. `timeout` falls back
    /// to [`RpcConfig::default_timeout`] when `None` or zero.
    ///
    /// Returns the call's correlation id once it is outstanding, or `None` when
    /// the call was never sent; in that case every callback has already been
    /// invoked with the reason (normally [`RpcError::ClientNotReady`]).
    ///
    /// A failed publish is logged and the call is left to time out.
    pub async fn call_rpc(
        &self,
        to: &str,
        method: &str,
        args: Vec<Value>,
        callbacks: Callbacks,
        timeout: Option<Duration>,
    ) -> Option<CorrelationId> {
        // ---
        let inner = &self.inner;

        if !self.is_ready() {
            log_warn!("{}: {method} to {to} while not ready", inner.config.node_id);
            callbacks.fail_all(RpcError::ClientNotReady);
            return None;
        }

        let id = inner.ids.next();
        let request = RpcRequest {
            method: method.to_string(),
            args,
            corr_id: id,
            reply_to: inner.reply_to.clone(),
        };

        let payload = match request.encode() {
            Ok(payload) => payload,
            Err(err) => {
                callbacks.fail_all(err);
                return None;
            }
        };

        let deadline = inner.config.effective_timeout(timeout);
        inner.pending.register(id, callbacks, deadline).ok()?;

        log_debug!("call {id}: {method} -> {to}, deadline {deadline:?}");

        let env = Envelope::json(Address::from(to), payload);
        if let Err(err) = inner.transport.publish(env).await {
            log_warn!("call {id}: publish to {to} failed, will time out: {err}");
        }

        Some(id)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        if let Some(join) = lock_ignore_poison(&self.listener).take() {
            join.abort();
        }
    }
}

/// Acquire mutex guard, ignoring poisoning.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
