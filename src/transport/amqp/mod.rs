//! AMQP protocol transports.
//!
//! Currently supports lapin (AMQP 0-9-1, RabbitMQ). When the
//! `transport_lapin` feature is off, the constructor is a stub that refuses
//! to connect, so callers can dispatch on the URI scheme unconditionally.

#[cfg(feature = "transport_lapin")]
mod lapin;

#[cfg(feature = "transport_lapin")]
pub use self::lapin::create_transport as create_lapin_transport;

#[cfg(not(feature = "transport_lapin"))]
pub async fn create_lapin_transport(config: &crate::RpcConfig) -> crate::Result<crate::TransportPtr> {
    Err(crate::RpcError::Transport(format!(
        "{}: AMQP support not compiled in (enable the `transport_lapin` feature)",
        config.transport_uri
    )))
}
