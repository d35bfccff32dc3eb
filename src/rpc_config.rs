//! Client configuration.
//!
//! The broker location and queue names are compiled-in defaults; the only
//! way to change them is to build a different `RpcConfig` in code.

use std::time::Duration;

use crate::{Result, RpcError};

/// Broker the client talks to unless told otherwise.
pub const DEFAULT_BROKER_URI: &str = "amqp://localhost:5672/%2f";

/// Well-known queue the run service consumes requests from.
pub const DEFAULT_REQUEST_QUEUE: &str = "running_queue";

/// Per-request wait bound used by [`RpcConfig::default`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// URI of the in-process transport.
pub const MEMORY_URI: &str = "memory://";

/// Transport and request settings for an [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Transport connection URI, e.g. `amqp://localhost:5672/%2f` or `memory://`.
    pub transport_uri: String,

    /// Identifier for this client's transport, used for logging.
    pub transport_id: String,

    /// Queue requests are published to.
    pub request_queue: String,

    /// How long a request waits for its reply.
    ///
    /// `None` waits forever: a reply that never arrives keeps the caller
    /// suspended until the request is cancelled or the client is closed.
    pub request_timeout: Option<Duration>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::with_broker(DEFAULT_BROKER_URI, "runner-client")
    }
}

impl RpcConfig {
    /// Config for a broker-backed transport.
    pub fn with_broker(transport_uri: impl Into<String>, transport_id: impl Into<String>) -> Self {
        Self {
            transport_uri: transport_uri.into(),
            transport_id: transport_id.into(),
            request_queue: DEFAULT_REQUEST_QUEUE.to_string(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Config for the in-memory transport (no broker).
    pub fn memory(transport_id: impl Into<String>) -> Self {
        Self::with_broker(MEMORY_URI, transport_id)
    }

    pub fn with_request_queue(mut self, queue: impl Into<String>) -> Self {
        self.request_queue = queue.into();
        self
    }

    /// Bound each request's wait for a reply.
    ///
    /// # Example
    ///
    /// ```
    /// use runner_rpc::RpcConfig;
    /// use std::time::Duration;
    ///
    /// let config = RpcConfig::default().with_request_timeout(Duration::from_secs(5));
    /// assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
    /// ```
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Wait for replies without a bound.
    pub fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }

    /// Reject configurations no transport could work with.
    pub(crate) fn validate(&self) -> Result<()> {
        // ---
        if self.transport_uri.trim().is_empty() {
            return Err(RpcError::MissingConfig("transport_uri".into()));
        }
        if self.request_queue.trim().is_empty() {
            return Err(RpcError::MissingConfig("request_queue".into()));
        }
        Ok(())
    }
}
