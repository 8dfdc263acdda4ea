//! Callback-correlated RPC over message-oriented middleware.
//!
//! A process issues a named call to a peer it can only reach through a
//! message broker and gets the answer back through callbacks keyed by reply
//! type. The crate handles correlation ids, the table of outstanding calls,
//! routing replies from a private reply channel, and per-call timeouts, with
//! exactly one terminal event per call.
//!
//! The broker itself is abstracted behind [`Transport`]; an in-memory
//! implementation ([`MemoryHub`]) is provided for tests and single-process use.

mod macros;
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

mod client;
mod domain;
mod protocol;
mod server;
mod transport;

mod rpc_config;

mod correlation;
mod error;

// Re-export main types
pub use client::{CallResult, Callbacks, Reply, RpcClient};
pub use server::{HandlerResult, RpcServer};

pub use rpc_config::{RpcConfig, DEFAULT_INBOX_CAPACITY, DEFAULT_REPLY_PREFIX, DEFAULT_TIMEOUT};

pub use correlation::{CorrelationId, IdAllocator};
pub use error::{Result, RpcError};

pub use protocol::{RpcReply, RpcRequest, REPLY_TYPE_CALLBACK};

pub use transport::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    MemoryHub,
};

// --- public re-exports
pub use domain::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};
