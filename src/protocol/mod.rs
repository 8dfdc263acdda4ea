//! Wire format of the RPC exchange.
//!
//! Requests and replies travel as JSON in the payload of a transport
//! [`Envelope`](crate::Envelope). Field names (`corrID`, `replyTo`, `type`)
//! match the peers this crate talks to.
mod message;

pub use message::{RpcReply, RpcRequest, REPLY_TYPE_CALLBACK};
