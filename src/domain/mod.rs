//! Domain layer public interface.
//!
//! Abstractions independent of any broker or client library. Consumers import
//! through this module rather than the individual files.

mod transport;

pub use transport::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};
