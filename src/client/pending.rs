use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::callbacks::{Callbacks, Reply};
use crate::protocol::RpcReply;
use crate::{log_debug, log_error, CorrelationId, Result, RpcError};

/// One outstanding call: its handlers and the timer that will expire it.
struct PendingCall {
    callbacks: Callbacks,
    timer: JoinHandle<()>,
}

/// Tracks calls waiting for a reply or a timeout.
///
/// Every entry leaves the table exactly once, through whichever of
/// [`resolve`](Self::resolve) or [`expire`](Self::expire) takes the lock
/// first; the loser finds nothing and does nothing. Handlers always run after
/// the lock is released, so they may issue further calls.
pub(super) struct PendingCalls {
    // ---
    calls: Mutex<HashMap<CorrelationId, PendingCall>>,
}

/// Acquire mutex guard, ignoring poisoning.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PendingCalls {
    // ---
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self {
            calls: Mutex::new(HashMap::new()),
        })
    }

    /// Register a call and arm its timeout.
    ///
    /// The timer task is spawned while the table is locked, so it cannot
    /// reach `expire` before the entry exists. A duplicate id fails the new
    /// call's handlers immediately and leaves the existing entry alone.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        id: CorrelationId,
        callbacks: Callbacks,
        deadline: Duration,
    ) -> Result<()> {
        // ---
        let mut calls = lock_ignore_poison(&self.calls);

        if calls.contains_key(&id) {
            drop(calls);
            let err = RpcError::DuplicateCorrelationId(id);
            log_error!("{err}");
            callbacks.fail_all(err.clone());
            return Err(err);
        }

        let table = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            table.expire(id, deadline);
        });

        calls.insert(id, PendingCall { callbacks, timer });
        Ok(())
    }

    /// Resolve call `reply.corr_id` with a reply from the peer.
    ///
    /// Returns `Ok(false)` when the id is not pending (already resolved,
    /// expired, or never issued here). A reply tag the call did not register
    /// still ends the call: every handler receives
    /// [`RpcError::UnknownReplyType`] and the same error is returned.
    pub fn resolve(&self, reply: RpcReply) -> Result<bool> {
        // ---
        let id = reply.corr_id;
        let call = lock_ignore_poison(&self.calls).remove(&id);

        let Some(call) = call else {
            return Ok(false);
        };

        // Harmless if the timer already fired; its expire() will find nothing.
        call.timer.abort();

        let payload = Reply {
            data: reply.data,
            err: reply.err,
        };

        match call.callbacks.deliver(&reply.kind, payload) {
            Ok(()) => Ok(true),
            Err(callbacks) => {
                let err = RpcError::UnknownReplyType {
                    id,
                    tag: reply.kind,
                };
                log_error!("protocol violation: {err}, registered tags {callbacks:?}");
                callbacks.fail_all(err.clone());
                Err(err)
            }
        }
    }

    /// Time out call `id` if it is still pending.
    pub fn expire(&self, id: CorrelationId, after: Duration) -> bool {
        // ---
        let call = lock_ignore_poison(&self.calls).remove(&id);

        match call {
            Some(call) => {
                log_debug!("call {id} timed out after {after:?}");
                call.callbacks.fail_all(RpcError::Timeout(after));
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        // ---
        lock_ignore_poison(&self.calls).len()
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        // ---
        lock_ignore_poison(&self.calls).contains_key(&id)
    }
}
