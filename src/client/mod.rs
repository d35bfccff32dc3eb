// src/client/mod.rs
//! RPC client implementation.
//!
//! [`RpcClient`] publishes requests to a well-known queue and matches replies
//! arriving on its private reply queue by correlation id.
//!
//! # Architecture
//!
//! At construction the client asks the transport for an ephemeral queue
//! (broker-named, exclusive) and spawns a receive loop over it. That queue is
//! the `reply_to` of every request the client sends for its whole lifetime.
//!
//! Each request generates a fresh correlation id and registers a oneshot in
//! the pending map before publishing. The receive loop looks up every reply
//! by correlation id; replies that match nothing are logged and discarded,
//! and the loop keeps going.
//!
//! # Concurrency
//!
//! Any number of requests may be in flight; each resolves independently.
//! The pending map sits behind a mutex held only for insert/remove.

mod pending;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::schema::AvroRecord;
use crate::{
    // ---
    codec,
    log_debug,
    log_info,
    log_trace,
    log_warn,
    Address,
    CorrelationId,
    Envelope,
    Result,
    RpcConfig,
    RpcError,
    SubscriptionHandle,
    TransportPtr,
};

use pending::PendingRequests;

/// Acquire a mutex guard, ignoring poisoning.
///
/// The pending map has no invariants spanning entries; at worst a reply is
/// dropped, which the waiting request observes as a closed channel.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Correlation-id RPC client.
///
/// Cheap to clone (internally `Arc`-backed); clones share the transport,
/// reply queue and pending map.
///
/// # Example
///
/// ```no_run
/// use runner_rpc::{RpcClient, RpcConfig};
/// use runner_rpc::schema::{RunList, RunRequest, UserRef};
///
/// # async fn example() -> runner_rpc::Result<()> {
/// let client = RpcClient::connect(RpcConfig::default()).await?;
///
/// let runs: RunList = client
///     .send_request(&RunRequest::for_user(UserRef { id: 1 }))
///     .await?;
/// println!("{} meters", runs.total_distance_meters());
///
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    config: RpcConfig,
    request_address: Address,
    reply_address: Address,
    pending: Arc<Mutex<PendingRequests>>,

    /// Cancelled by `close()`; wakes every waiting request and the receive loop.
    shutdown: CancellationToken,

    /// Cancelled by the receive loop when the reply queue goes away.
    reply_closed: CancellationToken,

    rx_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    // ---
    /// Open a transport from `config` and build a client on it.
    ///
    /// # Errors
    ///
    /// Propagates the transport's connection error, or
    /// [`RpcError::MissingConfig`] for an unusable config.
    pub async fn connect(config: RpcConfig) -> Result<Self> {
        // ---
        let transport = crate::create_transport(&config).await?;
        Self::with_transport(transport, config).await
    }

    /// Build a client on an existing transport.
    ///
    /// Declares the client's reply queue and starts the receive loop. The
    /// client takes over the transport: [`close`](Self::close) closes it.
    pub async fn with_transport(transport: TransportPtr, config: RpcConfig) -> Result<Self> {
        // ---
        config.validate()?;

        let handle = transport.subscribe_ephemeral().await?;
        let reply_address = handle.address.clone();

        log_info!(
            "[{}] reply queue {reply_address}, requests to {}",
            transport.transport_id(),
            config.request_queue
        );

        let pending = Arc::new(Mutex::new(PendingRequests::new()));
        let shutdown = CancellationToken::new();
        let reply_closed = CancellationToken::new();

        let rx_task = tokio::spawn(receive_loop(
            transport.transport_id().to_string(),
            handle,
            Arc::clone(&pending),
            shutdown.clone(),
            reply_closed.clone(),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                request_address: Address::from(config.request_queue.as_str()),
                transport,
                config,
                reply_address,
                pending,
                shutdown,
                reply_closed,
                rx_task: tokio::sync::Mutex::new(Some(rx_task)),
            }),
        })
    }

    /// The broker-allocated queue replies are delivered to.
    pub fn reply_address(&self) -> &Address {
        &self.inner.reply_address
    }

    /// The queue requests are published to.
    pub fn request_address(&self) -> &Address {
        &self.inner.request_address
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// Send a request and wait for the matching reply, bounded by the
    /// configured `request_timeout`.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Serialization`] if the request cannot be encoded or the
    ///   reply cannot be decoded.
    /// - [`RpcError::Transport`] if the publish fails.
    /// - [`RpcError::Timeout`] if no matching reply arrives in time.
    /// - [`RpcError::Cancelled`] if the client is closed while waiting.
    /// - [`RpcError::ReplyChannelClosed`] if the reply queue goes away.
    pub async fn send_request<TReq, TResp>(&self, request: &TReq) -> Result<TResp>
    where
        TReq: Serialize + AvroRecord,
        TResp: DeserializeOwned + AvroRecord,
    {
        self.send_request_with_timeout(request, self.inner.config.request_timeout)
            .await
    }

    /// Like [`send_request`](Self::send_request) with an explicit wait bound.
    ///
    /// `None` waits until a reply arrives or the client is closed.
    pub async fn send_request_with_timeout<TReq, TResp>(
        &self,
        request: &TReq,
        timeout: Option<Duration>,
    ) -> Result<TResp>
    where
        TReq: Serialize + AvroRecord,
        TResp: DeserializeOwned + AvroRecord,
    {
        // ---
        let payload = codec::encode(request)?;
        let reply = self.round_trip(payload, timeout, None).await?;
        codec::decode(&reply)
    }

    /// Like [`send_request`](Self::send_request), abandoning the wait when
    /// `cancel` fires.
    pub async fn send_request_cancellable<TReq, TResp>(
        &self,
        request: &TReq,
        cancel: &CancellationToken,
    ) -> Result<TResp>
    where
        TReq: Serialize + AvroRecord,
        TResp: DeserializeOwned + AvroRecord,
    {
        // ---
        let payload = codec::encode(request)?;
        let reply = self
            .round_trip(payload, self.inner.config.request_timeout, Some(cancel))
            .await?;
        codec::decode(&reply)
    }

    /// Publish one encoded request and wait for the reply payload.
    async fn round_trip(
        &self,
        payload: Bytes,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes> {
        // ---
        let inner = &self.inner;
        let correlation_id = CorrelationId::generate();

        let rx = lock_ignore_poison(&inner.pending).register(correlation_id.clone());

        // The receive loop cancels `reply_closed` before it clears the map, so
        // an entry registered after the clear is caught here.
        if inner.reply_closed.is_cancelled() {
            lock_ignore_poison(&inner.pending).remove(&correlation_id);
            return Err(self.closed_error());
        }

        let env = Envelope::request(
            inner.request_address.clone(),
            payload,
            correlation_id.as_shared(),
            inner.reply_address.clone(),
            Arc::from(codec::CONTENT_TYPE),
        );

        if let Err(e) = inner.transport.publish(env).await {
            lock_ignore_poison(&inner.pending).remove(&correlation_id);
            return Err(e);
        }

        log_debug!(
            "[{}] request {correlation_id} published to {}",
            inner.transport.transport_id(),
            inner.request_address
        );

        let outcome = tokio::select! {
            biased;
            reply = rx => reply.map_err(|_| self.closed_error()),
            _ = inner.shutdown.cancelled() => Err(RpcError::Cancelled),
            _ = inner.reply_closed.cancelled() => Err(self.closed_error()),
            _ = cancelled(cancel) => Err(RpcError::Cancelled),
            _ = expired(timeout) => Err(RpcError::Timeout),
        };

        if outcome.is_err() {
            lock_ignore_poison(&inner.pending).remove(&correlation_id);
            log_debug!(
                "[{}] request {correlation_id} abandoned: {:?}",
                inner.transport.transport_id(),
                outcome.as_ref().err()
            );
        }

        outcome
    }

    /// Why a request can no longer get its reply.
    fn closed_error(&self) -> RpcError {
        if self.inner.shutdown.is_cancelled() {
            RpcError::Cancelled
        } else {
            RpcError::ReplyChannelClosed
        }
    }

    /// Stop the receive loop, fail every waiting request and close the
    /// transport. Calling it again is a no-op.
    ///
    /// Concurrent callers all return only once the transport is closed.
    pub async fn close(&self) -> Result<()> {
        // ---
        let inner = &self.inner;
        inner.shutdown.cancel();

        let mut rx_task = inner.rx_task.lock().await;
        if let Some(task) = rx_task.take() {
            let _ = task.await;
            log_info!("[{}] closing client", inner.transport.transport_id());
            inner.transport.close().await?;
        }

        Ok(())
    }
}

/// Resolves when `token` fires; never, without one.
fn cancelled(token: Option<&CancellationToken>) -> impl Future<Output = ()> + '_ {
    // ---
    async move {
        match token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

/// Resolves after `timeout`; never, without one.
async fn expired(timeout: Option<Duration>) {
    // ---
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Route replies from the reply queue to waiting requests.
async fn receive_loop(
    transport_id: String,
    mut handle: SubscriptionHandle,
    pending: Arc<Mutex<PendingRequests>>,
    shutdown: CancellationToken,
    reply_closed: CancellationToken,
) {
    // ---
    log_debug!("[{transport_id}] receive loop started on {}", handle.address);

    loop {
        let envelope = tokio::select! {
            _ = shutdown.cancelled() => break,
            envelope = handle.inbox.recv() => match envelope {
                Some(envelope) => envelope,
                None => {
                    log_warn!("[{transport_id}] reply queue {} closed", handle.address);
                    break;
                }
            },
        };

        let correlation_id = match envelope.correlation_id {
            Some(id) => CorrelationId::from(id),
            None => {
                log_warn!("[{transport_id}] reply without correlation_id discarded");
                continue;
            }
        };

        let delivered = lock_ignore_poison(&pending).complete(&correlation_id, envelope.payload);
        if delivered {
            log_trace!("[{transport_id}] reply {correlation_id} delivered");
        } else {
            log_debug!("[{transport_id}] no pending request for {correlation_id}, discarded");
        }
    }

    // Whoever is still waiting learns the reply will never come, and so does
    // anyone who registers afterwards.
    reply_closed.cancel();
    let dropped = lock_ignore_poison(&pending).clear();
    log_debug!("[{transport_id}] receive loop stopped, {dropped} request(s) abandoned");
}
