use thiserror::Error;

/// Errors that can occur while issuing a request.
///
/// There is no retry layer: every variant is handed back to the caller
/// unchanged, and the caller decides whether to give up.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Broker connection, channel, publish or consume failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request or response payload could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] apache_avro::Error),

    /// No reply with a matching correlation id arrived in time.
    #[error("request timed out")]
    Timeout,

    /// The request was cancelled, either by its token or by `close()`.
    #[error("request cancelled")]
    Cancelled,

    /// The reply queue consumer stopped while the request was waiting.
    #[error("reply channel closed before a matching response arrived")]
    ReplyChannelClosed,

    /// A required configuration value is missing or empty.
    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
