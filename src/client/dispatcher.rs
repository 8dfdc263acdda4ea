use std::sync::Arc;

use super::pending::PendingCalls;
use crate::protocol::RpcReply;
use crate::transport::runner::TransportConsumer;
use crate::{log_debug, Address, Envelope, Result, Subscription};

/// Routes envelopes arriving on the private reply channel to pending calls.
///
/// Replies for ids that are not pending are expected under timeout races and
/// after restarts; they are dropped quietly.
pub(super) struct ReplyDispatcher {
    // ---
    reply_to: Address,
    pending: Arc<PendingCalls>,
}

impl ReplyDispatcher {
    pub fn new(reply_to: Address, pending: Arc<PendingCalls>) -> Self {
        // ---
        Self { reply_to, pending }
    }

    /// Handle one inbound reply envelope.
    ///
    /// # Errors
    ///
    /// Undecodable payloads and replies with an unregistered type tag are
    /// reported to the receive loop, which logs them.
    pub fn on_message(&self, env: &Envelope) -> Result<()> {
        // ---
        let reply = RpcReply::decode(&env.payload)?;
        let id = reply.corr_id;

        if !self.pending.resolve(reply)? {
            log_debug!("{}: dropping reply for call {id}, not pending", self.reply_to);
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl TransportConsumer for ReplyDispatcher {
    // ---
    fn subscription(&self) -> Subscription {
        Subscription::from(self.reply_to.clone())
    }

    async fn handle_envelope(&self, env: Envelope) -> Result<()> {
        self.on_message(&env)
    }
}
