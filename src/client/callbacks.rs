use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::protocol::REPLY_TYPE_CALLBACK;
use crate::{log_error, RpcError};

/// Payload of a reply as sent by the remote peer.
///
/// `data` and `err` are relayed untouched; a peer may set either, both, or
/// neither. Interpreting a remote error is up to the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub data: Option<Value>,
    pub err: Option<Value>,
}

impl Reply {
    /// Whether the peer reported an error.
    pub fn is_remote_error(&self) -> bool {
        self.err.is_some()
    }
}

/// What a callback receives: the peer's reply, or a local terminal error
/// (`ClientNotReady`, `Timeout`, `UnknownReplyType`).
pub type CallResult = std::result::Result<Reply, RpcError>;

type Handler = Box<dyn FnOnce(CallResult) + Send + 'static>;

/// The closed set of reply handlers for one call, keyed by reply-type tag.
///
/// Built at issuance and never extended afterwards; a reply whose tag is not
/// in the set is a protocol violation. Construction requires at least one
/// handler. Each handler is `FnOnce`: a call has exactly one terminal event.
///
/// A handler that panics is contained and logged; it does not stop the
/// reply listener or the remaining handlers.
///
/// ```
/// use mom_rpc_callbacks::Callbacks;
///
/// let callbacks = Callbacks::callback(|result| println!("done: {result:?}"))
///     .on("onError", |result| println!("failed: {result:?}"));
/// assert_eq!(callbacks.tags().collect::<Vec<_>>(), ["callback", "onError"]);
/// ```
pub struct Callbacks {
    slots: BTreeMap<String, Handler>,
}

impl Callbacks {
    /// Start a set with a handler for `tag`.
    pub fn new<F>(tag: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        // ---
        let mut slots: BTreeMap<String, Handler> = BTreeMap::new();
        slots.insert(tag.into(), Box::new(handler));
        Self { slots }
    }

    /// Start a set with a handler for the standard `"callback"` tag.
    pub fn callback<F>(handler: F) -> Self
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        Self::new(REPLY_TYPE_CALLBACK, handler)
    }

    /// Add (or replace) the handler for `tag`.
    pub fn on<F>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        self.slots.insert(tag.into(), Box::new(handler));
        self
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Invoke the handler registered for `tag`, dropping the others.
    ///
    /// Hands the set back untouched when `tag` is unknown.
    pub(crate) fn deliver(mut self, tag: &str, reply: Reply) -> std::result::Result<(), Self> {
        // ---
        match self.slots.remove(tag) {
            Some(handler) => {
                invoke(tag, handler, Ok(reply));
                Ok(())
            }
            None => Err(self),
        }
    }

    /// Invoke every handler with the same error.
    pub(crate) fn fail_all(self, err: RpcError) {
        // ---
        for (tag, handler) in self.slots {
            invoke(&tag, handler, Err(err.clone()));
        }
    }
}

fn invoke(tag: &str, handler: Handler, result: CallResult) {
    // ---
    if panic::catch_unwind(AssertUnwindSafe(|| handler(result))).is_err() {
        log_error!("reply handler for '{tag}' panicked");
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}
