//! Request/response RPC over a message broker, matched by correlation id.
//!
//! A client publishes an encoded request to a well-known queue, tagging it
//! with a fresh correlation id and the name of its private reply queue, then
//! waits for the reply carrying the same correlation id.
//!
//! The broker connection sits behind the [`Transport`] trait: AMQP via
//! `lapin` (feature `transport_lapin`, on by default) or an in-process
//! [`MemoryHub`] for tests.

// Import all sub modules once...
mod client;
mod domain;
mod macros;
mod transport;

mod rpc_config;

mod correlation;
mod error;

pub mod codec;
pub mod driver;
pub mod schema;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// Re-export main types
pub use client::RpcClient;

pub use rpc_config::{
    //
    RpcConfig,
    DEFAULT_BROKER_URI,
    DEFAULT_REQUEST_QUEUE,
    DEFAULT_REQUEST_TIMEOUT,
    MEMORY_URI,
};

pub use correlation::CorrelationId;
pub use error::{Result, RpcError};

pub use transport::{
    //
    create_lapin_transport,
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
    TransportBase,
    TransportPtr,
};

pub use tokio_util::sync::CancellationToken;

/// Create the transport named by `config.transport_uri`.
///
/// - `memory://…` → in-memory transport on the process-global hub
/// - `amqp://…`, `amqps://…` → lapin transport (connects immediately)
///
/// # Errors
///
/// [`RpcError::MissingConfig`] for an empty URI or request queue,
/// [`RpcError::Transport`] for an unknown scheme or a failed connection.
pub async fn create_transport(config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    config.validate()?;

    let uri = config.transport_uri.as_str();
    let scheme = uri.split_once("://").map(|(scheme, _)| scheme);

    match scheme {
        Some("memory") => create_memory_transport(config).await,
        Some("amqp") | Some("amqps") => create_lapin_transport(config).await,
        _ => Err(RpcError::Transport(format!(
            "unrecognized transport uri: {uri}, expected memory:// or amqp://"
        ))),
    }
}
