// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! Defines the interface the RPC client uses to exchange messages with a
//! broker, without naming any concrete protocol or client library.
//!
//! The transport layer only delivers opaque envelopes to subscribed
//! consumers. Correlation, timeouts and cancellation live in the client.
//!
//! Concrete implementations live under `src/transport/`.
use crate::{Result, RpcConfig};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base` so that the
/// default `Transport` methods can delegate to it.
pub struct TransportBase {
    /// Identifier of this transport instance, used as a logging tag.
    pub transport_id: String,
    /// Broker URI the transport was created from.
    pub uri: String,
}

impl From<&RpcConfig> for TransportBase {
    fn from(config: &RpcConfig) -> Self {
        // ---
        Self {
            transport_id: config.transport_id.clone(),
            uri: config.transport_uri.clone(),
        }
    }
}

/// A transport address (a queue name, for AMQP).
///
/// Addresses are immutable, cheap to clone and safe to share across threads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(Arc::from(value))
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address(Arc::from(value))
    }
}

impl From<Arc<str>> for Address {
    fn from(value: Arc<str>) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named queue to consume from.
///
/// Matching is exact: a subscription receives envelopes whose address has
/// the same string value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub Arc<str>);

impl From<Address> for Subscription {
    fn from(address: Address) -> Self {
        Subscription(address.0)
    }
}

impl From<&str> for Subscription {
    fn from(value: &str) -> Self {
        Subscription(Arc::from(value))
    }
}

impl From<String> for Subscription {
    fn from(value: String) -> Self {
        Subscription(Arc::from(value))
    }
}

/// An opaque message envelope.
///
/// Carries the payload plus the metadata the RPC pattern relies on:
/// a correlation id and, on requests, the address replies go to.
/// Transports deliver envelopes without interpreting payload or metadata.
///
/// # Examples
///
/// ```
/// # use runner_rpc::{Address, Envelope};
/// # use bytes::Bytes;
/// # use std::sync::Arc;
/// let request = Envelope::request(
///     Address::from("running_queue"),
///     Bytes::from_static(b"\x02"),
///     Arc::from("correlation-123"),
///     Address::from("amq.gen-reply"),
///     Arc::from("avro/binary"),
/// );
/// assert_eq!(request.reply_to, Some(Address::from("amq.gen-reply")));
///
/// let response = Envelope::response(
///     Address::from("amq.gen-reply"),
///     Bytes::new(),
///     Arc::from("correlation-123"),
///     Arc::from("avro/binary"),
/// );
/// assert!(response.reply_to.is_none());
/// ```
#[derive(Clone, Debug)]
pub struct Envelope {
    // ---
    /// Delivery address (queue name / routing key).
    pub address: Address,

    /// Opaque payload bytes, encoded by the schema codec.
    pub payload: Bytes,

    /// Correlation identifier used to associate requests with responses.
    pub correlation_id: Option<Arc<str>>,

    /// Where the server must publish the response. Set on requests only.
    pub reply_to: Option<Address>,

    /// Informational payload format tag.
    pub content_type: Option<Arc<str>>,
}

impl Envelope {
    // ---
    /// Create a request envelope.
    pub fn request(
        address: Address,
        payload: Bytes,
        correlation_id: Arc<str>,
        reply_to: Address,
        content_type: Arc<str>,
    ) -> Self {
        // ---
        Self {
            address,
            payload,
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to),
            content_type: Some(content_type),
        }
    }

    /// Create a response envelope, addressed to the request's `reply_to`.
    pub fn response(
        address: Address,
        payload: Bytes,
        correlation_id: Arc<str>,
        content_type: Arc<str>,
    ) -> Self {
        // ---
        Self {
            address,
            payload,
            correlation_id: Some(correlation_id),
            reply_to: None,
            content_type: Some(content_type),
        }
    }
}

/// Handle returned from a successful subscription.
///
/// `address` is the queue actually being consumed; for ephemeral
/// subscriptions it is the name the broker generated.
///
/// The inbox yields `None` once the transport is closed or the broker-side
/// consumer ends.
pub struct SubscriptionHandle {
    // ---
    pub address: Address,
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Transport abstraction.
///
/// Best-effort delivery of envelopes between publishers and queue consumers.
///
/// Implementations must ensure that:
/// - Once `subscribe()`/`subscribe_ephemeral()` returns, envelopes published
///   *after* that point to the subscribed address are deliverable.
/// - `publish()` does not wait for consumers to process the envelope.
///
/// The in-memory transport serves as the reference implementation.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Publish an envelope to `env.address`.
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Consume a well-known, named queue.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle>;

    /// Declare a private queue with a broker-generated name and consume it.
    ///
    /// The queue is exclusive to this transport and goes away with it.
    async fn subscribe_ephemeral(&self) -> Result<SubscriptionHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
pub type TransportPtr = Arc<dyn Transport>;
