//! Domain layer public interface.
//!
//! Abstractions independent of brokers and client libraries.
//! Consumers import these symbols via this module, not the individual files.

mod transport;

pub use transport::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};
