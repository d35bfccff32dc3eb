//! In-memory transport implementation.
//!
//! A pure in-process implementation of the domain-level `Transport` trait,
//! used for tests and as the reference for transport semantics:
//!
//! - Once `subscribe()` returns, envelopes published *after* that point to
//!   the subscribed address are deliverable.
//! - Delivery is deterministic within a single process.
//! - Envelopes published to an address nobody consumes are dropped, the same
//!   way a broker's default exchange drops unroutable messages.
//!
//! It does not emulate persistence, network failures or broker-specific
//! delivery guarantees.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{
    // ---
    log_debug,
    log_trace,
    Address,
    Envelope,
    Result,
    RpcConfig,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};

const INBOX_CAPACITY: usize = 16;

struct Subscriber {
    owner: u64,
    tx: mpsc::Sender<Envelope>,
}

/// Shared message bus for the in-memory transport.
///
/// Simulates a broker within a single process. All memory transports that
/// share a hub see each other's messages, exactly as nodes connected to one
/// broker would.
///
/// Integration tests create their own hub so parallel tests stay isolated:
///
/// ```
/// # use runner_rpc::{MemoryHub, RpcConfig};
/// # async fn example() -> runner_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let server = runner_rpc::create_memory_transport_with_hub(&RpcConfig::memory("server"), hub.clone()).await?;
/// let client = runner_rpc::create_memory_transport_with_hub(&RpcConfig::memory("client"), hub).await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Subscription, Vec<Subscriber>>>,
    next_owner: AtomicU64,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register_owner(&self) -> u64 {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }

    async fn publish(&self, transport_id: &str, env: Envelope) -> Result<()> {
        // ---
        let key = Subscription::from(env.address.clone());

        // Senders are cloned out so a slow inbox never holds the hub lock.
        let senders: Vec<mpsc::Sender<Envelope>> = {
            let subs = self.subscriptions.read().await;
            match subs.get(&key) {
                Some(subscribers) => subscribers.iter().map(|s| s.tx.clone()).collect(),
                None => Vec::new(),
            }
        };

        if senders.is_empty() {
            log_debug!("{transport_id}: no consumer for {}, envelope dropped", env.address);
            return Ok(());
        }

        for tx in senders {
            // A closed channel means the handle was dropped.
            if tx.send(env.clone()).await.is_err() {
                log_trace!("{transport_id}: dropped subscriber on {}", env.address);
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        transport_id: &str,
        owner: u64,
        sub: Subscription,
    ) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{transport_id}: subscribe to {sub:?}");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let address = Address::from(Arc::clone(&sub.0));

        let mut subs = self.subscriptions.write().await;
        subs.entry(sub).or_default().push(Subscriber { owner, tx });

        Ok(SubscriptionHandle { address, inbox: rx })
    }

    /// Remove every subscription registered by `owner`, closing their inboxes.
    async fn release(&self, transport_id: &str, owner: u64) {
        // ---
        log_debug!("{transport_id}: releasing subscriptions");

        let mut subs = self.subscriptions.write().await;
        for subscribers in subs.values_mut() {
            subscribers.retain(|s| s.owner != owner);
        }
        subs.retain(|_, subscribers| !subscribers.is_empty());
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_owner: AtomicU64::new(1),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport routing envelopes through a shared [`MemoryHub`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
    owner: u64,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn publish(&self, env: Envelope) -> Result<()> {
        self.hub.publish(self.transport_id(), env).await
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        self.hub.subscribe(self.transport_id(), self.owner, sub).await
    }

    /// Generates a broker-style `amq.gen-…` name and subscribes to it.
    async fn subscribe_ephemeral(&self) -> Result<SubscriptionHandle> {
        // ---
        let name = format!("amq.gen-{}", Uuid::new_v4().simple());
        self.hub
            .subscribe(self.transport_id(), self.owner, Subscription::from(name))
            .await
    }

    /// Drops this transport's subscriptions only; other transports on the
    /// same hub keep theirs.
    async fn close(&self) -> Result<()> {
        self.hub.release(self.transport_id(), self.owner).await;
        Ok(())
    }
}

/// Create an in-memory transport on the process-global hub.
pub async fn create_memory_transport(config: &RpcConfig) -> Result<TransportPtr> {
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create an in-memory transport on an explicitly constructed hub.
///
/// Mainly for tests that need isolation from each other.
pub async fn create_memory_transport_with_hub(
    config: &RpcConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create memory transport", config.transport_id);

    let owner = hub.register_owner();
    Ok(Arc::new(MemoryTransport {
        base: TransportBase::from(config),
        hub,
        owner,
    }))
}
