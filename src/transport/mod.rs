//! Transport implementations and the receive-loop runner.
//!
//! Domain code depends only on the `Transport` trait; concrete transports are
//! exposed through constructor functions.

mod memory;
pub(crate) mod runner;

pub use memory::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    MemoryHub,
};
