use crate::CorrelationId;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Requests waiting for a reply, keyed by correlation id.
///
/// Each entry holds the sending half of the oneshot the caller is awaiting.
/// The receive loop completes entries; the caller removes its own entry when
/// it stops waiting (timeout, cancellation, publish failure).
pub(super) struct PendingRequests {
    // ---
    requests: HashMap<CorrelationId, oneshot::Sender<Bytes>>,
}

impl PendingRequests {
    // ---
    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
        }
    }

    /// Register a new pending request.
    ///
    /// Returns a receiver that resolves when the reply arrives, or errors
    /// if the entry is dropped without a reply.
    pub fn register(&mut self, correlation_id: CorrelationId) -> oneshot::Receiver<Bytes> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.requests.insert(correlation_id, tx);
        rx
    }

    /// Hand a reply payload to the request waiting on `correlation_id`.
    ///
    /// Returns false if nobody is waiting on that id.
    pub fn complete(&mut self, correlation_id: &CorrelationId, payload: Bytes) -> bool {
        // ---
        match self.requests.remove(correlation_id) {
            // The receiver may have given up in the meantime; that is fine.
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    pub fn remove(&mut self, correlation_id: &CorrelationId) -> bool {
        self.requests.remove(correlation_id).is_some()
    }

    /// Drop every entry; their receivers observe a closed channel.
    pub fn clear(&mut self) -> usize {
        // ---
        let dropped = self.requests.len();
        self.requests.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
