//! RPC responder: the peer side that answers `call_rpc` requests.
//!
//! Subscribes to its own address, runs the handler registered for each
//! request's `method`, and publishes a `"callback"` reply to the request's
//! `replyTo`. Requests for unknown methods are answered with an `err` reply
//! so the caller fails fast instead of waiting for its timeout.
mod handler;

pub use handler::HandlerResult;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::protocol::{RpcReply, RpcRequest};
use crate::transport::runner::{self, TransportConsumer};
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    Address,
    Envelope,
    Result,
    RpcError,
    Subscription,
    TransportPtr,
};
use handler::{wrap_handler, BoxedHandler};

type HandlerRegistry = Arc<Mutex<HashMap<String, BoxedHandler>>>;

/// Acquire mutex guard, ignoring poisoning.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Answers RPC requests addressed to one node.
///
/// Handlers can be registered before or after [`spawn`](Self::spawn); each
/// request runs in its own task.
///
/// ```no_run
/// use mom_rpc_callbacks::{create_memory_transport, RpcConfig, RpcServer};
/// use serde_json::{json, Value};
///
/// # async fn example() -> mom_rpc_callbacks::Result<()> {
/// let transport = create_memory_transport(&RpcConfig::new("nodeA")).await?;
/// let server = RpcServer::new(transport, "nodeA");
/// server.register("getStatus", |_args: Vec<Value>| async move { Ok(json!("ok")) });
/// server.spawn().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    transport: TransportPtr,
    address: Address,
    handlers: HandlerRegistry,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcServer {
    /// Create a server answering requests published to `address`.
    pub fn new(transport: TransportPtr, address: impl Into<Address>) -> Self {
        // ---
        Self {
            inner: Arc::new(ServerInner {
                transport,
                address: address.into(),
                handlers: Arc::new(Mutex::new(HashMap::new())),
                task: Mutex::new(None),
            }),
        }
    }

    /// Register (or replace) the handler for `method`.
    pub fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        // ---
        lock_ignore_poison(&self.inner.handlers).insert(method.to_string(), wrap_handler(handler));
    }

    /// Subscribe to the server's address and start answering requests.
    ///
    /// Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the transport refuses the subscription.
    pub async fn spawn(&self) -> Result<()> {
        // ---
        if lock_ignore_poison(&self.inner.task).is_some() {
            return Ok(());
        }

        let consumer = RequestConsumer {
            address: self.inner.address.clone(),
            transport: self.inner.transport.clone(),
            handlers: self.inner.handlers.clone(),
        };
        let join = runner::run(self.inner.transport.clone(), consumer).await?;
        *lock_ignore_poison(&self.inner.task) = Some(join);

        log_info!("server listening on {}", self.inner.address);
        Ok(())
    }

    /// Stop answering requests. In-flight handlers still publish their reply.
    pub fn shutdown(&self) {
        // ---
        if let Some(join) = lock_ignore_poison(&self.inner.task).take() {
            join.abort();
        }
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }
}

struct RequestConsumer {
    address: Address,
    transport: TransportPtr,
    handlers: HandlerRegistry,
}

#[async_trait::async_trait]
impl TransportConsumer for RequestConsumer {
    // ---
    fn subscription(&self) -> Subscription {
        Subscription::from(self.address.clone())
    }

    async fn handle_envelope(&self, env: Envelope) -> Result<()> {
        // ---
        let request = RpcRequest::decode(&env.payload)?;
        let handler = lock_ignore_poison(&self.handlers)
            .get(&request.method)
            .cloned();

        let Some(handler) = handler else {
            let err = RpcError::NoHandler(request.method.clone());
            let reply = RpcReply::error(request.corr_id, json!(err.to_string()));
            publish_reply(&self.transport, request.reply_to, reply).await;
            return Err(err);
        };

        log_debug!(
            "{}: call {} {}({} args)",
            self.address,
            request.corr_id,
            request.method,
            request.args.len()
        );

        let transport = self.transport.clone();
        tokio::spawn(async move {
            let reply = match handler(request.args).await {
                Ok(data) => RpcReply::callback(request.corr_id, data),
                Err(err) => RpcReply::error(request.corr_id, err),
            };
            publish_reply(&transport, request.reply_to, reply).await;
        });

        Ok(())
    }
}

async fn publish_reply(transport: &TransportPtr, reply_to: Address, reply: RpcReply) {
    // ---
    let payload = match reply.encode() {
        Ok(payload) => payload,
        Err(err) => {
            log_error!("failed to encode reply {}: {err}", reply.corr_id);
            return;
        }
    };

    if let Err(err) = transport.publish(Envelope::json(reply_to, payload)).await {
        log_error!("failed to publish reply {}: {err}", reply.corr_id);
    }
}
