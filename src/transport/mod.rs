//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait. Broker
//! transports sit behind feature flags and are exposed only through
//! constructor functions; the in-memory transport is always available.
//!
//! Domain code must not depend on transport-specific types.

mod amqp;
mod memory;

pub use amqp::create_lapin_transport;
pub use memory::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};
