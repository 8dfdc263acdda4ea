//! Transport receive-loop runner.
//!
//! Glue between a [`Transport`](crate::Transport) and a message-driven role:
//! subscribe with the role's [`Subscription`], pull envelopes off the inbox in a
//! spawned task, and hand each one to the role. Both the client's reply
//! listener and the server's request loop are driven from here.
//!
//! Errors returned by [`TransportConsumer::handle_envelope`] are logged at
//! `warn` and never stop the loop; one bad message must not take down the
//! consumer. The loop ends when the transport closes the inbox or the task is
//! aborted.

use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_warn,
    Envelope,
    Result,
    Subscription,
    TransportPtr,
};

/// A consumer of transport-delivered envelopes.
///
/// Implementations should assume envelopes may arrive out of order, be
/// duplicated, or be stale, depending on the transport.
#[async_trait::async_trait]
pub(crate) trait TransportConsumer: Send + Sync {
    /// Subscription used to receive incoming envelopes.
    fn subscription(&self) -> Subscription;

    /// Handle a single incoming envelope.
    async fn handle_envelope(&self, env: Envelope) -> Result<()>;
}

/// Subscribe `consumer` on `transport` and spawn its receive loop.
///
/// Once this returns, envelopes published to the consumer's subscription are
/// deliverable. Dropping the returned handle does not stop the loop; abort it.
pub(crate) async fn run<T>(transport: TransportPtr, consumer: T) -> Result<JoinHandle<()>>
where
    T: TransportConsumer + 'static,
{
    // ---
    let sub = consumer.subscription();
    let mut handle = transport.subscribe(sub.clone()).await?;

    let transport_id = transport.transport_id().to_string();
    log_debug!("{transport_id}: receive loop started for {sub:?}");

    let join = tokio::spawn(async move {
        // ---
        while let Some(env) = handle.inbox.recv().await {
            if let Err(err) = consumer.handle_envelope(env).await {
                log_warn!("{transport_id}: consumer error: {err}");
            }
        }

        log_debug!("{transport_id}: receive loop for {sub:?} stopped, inbox closed");
    });

    Ok(join)
}
