//! AMQP transport implementation using `lapin`.
//!
//! ## Concurrency model
//!
//! A single background **actor task** owns the AMQP connection and channel
//! and handles publishing, queue declaration, consumer start-up and shutdown.
//! The public `AmqpTransport` only sends commands to it, which keeps the
//! `Transport` contract (`Send + Sync`) without sharing the connection.
//!
//! ## Message mapping
//!
//! Envelopes map onto plain AMQP messages so that any AMQP RPC server can
//! answer them:
//!
//! - the payload is the message body, unmodified;
//! - `correlation_id`, `reply_to` and `content_type` are the basic properties
//!   of the same name;
//! - publishes go to the default exchange with the queue name as routing key.
//!
//! ## Queue semantics
//!
//! - Named queues are declared non-durable and auto-delete.
//! - Ephemeral queues are declared with an empty name (the broker picks one),
//!   exclusive and auto-delete, so they vanish with the connection.
//! - Consumers run in no-ack mode; delivery is best-effort.

use lapin::{
    //
    options::{
        //
        BasicConsumeOptions,
        BasicPublishOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties,
    Channel,
    Connection,
    ConnectionProperties,
    Consumer,
};

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::{
    //
    log_debug,
    log_error,
    log_info,
    log_trace,
    Address,
    Envelope,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};

const CMD_CAPACITY: usize = 16;
const INBOX_CAPACITY: usize = 16;

type SubscriberMap = Arc<RwLock<HashMap<String, Vec<mpsc::Sender<Envelope>>>>>;

//
// Actor commands
//

enum Cmd {
    //
    Publish {
        env: Envelope,
        resp: oneshot::Sender<Result<()>>,
    },
    /// `queue: None` asks the broker to name the queue.
    Subscribe {
        queue: Option<String>,
        inbox: mpsc::Sender<Envelope>,
        resp: oneshot::Sender<Result<String>>,
    },
    Close {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// AMQP transport implementation using lapin.
pub struct AmqpTransport {
    // ---
    base: TransportBase,
    cmd_tx: mpsc::Sender<Cmd>,
    subscribers: SubscriberMap,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl AmqpTransport {
    /// Wraps an open connection and channel, spawning the actor that owns them.
    fn create(config: &RpcConfig, connection: Connection, channel: Channel) -> TransportPtr {
        // ---
        let base = TransportBase::from(config);

        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CAPACITY);
        let subscribers: SubscriberMap = Arc::new(RwLock::new(HashMap::new()));

        let actor = Actor {
            transport_id: base.transport_id.clone(),
            connection,
            channel,
            cmd_rx,
            subscribers: Arc::clone(&subscribers),
            consumer_handles: HashMap::new(),
        };

        let handle = tokio::spawn(actor.run());

        Arc::new(Self {
            base,
            cmd_tx,
            subscribers,
            actor: Mutex::new(Some(handle)),
        })
    }

    async fn send_cmd<T>(&self, cmd: Cmd, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        // ---
        self.cmd_tx.send(cmd).await.map_err(|e| {
            RpcError::Transport(format!("amqp: actor command channel closed: {e}"))
        })?;

        rx.await.map_err(|e| {
            RpcError::Transport(format!("amqp: actor dropped the response: {e}"))
        })?
    }

    async fn register(&self, queue: Option<String>) -> Result<SubscriptionHandle> {
        // ---
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (resp_tx, resp_rx) = oneshot::channel();

        let name = self
            .send_cmd(
                Cmd::Subscribe {
                    queue,
                    inbox: inbox_tx,
                    resp: resp_tx,
                },
                resp_rx,
            )
            .await?;

        Ok(SubscriptionHandle {
            address: Address::from(name),
            inbox: inbox_rx,
        })
    }
}

/// Background actor task that owns the AMQP connection and channel.
struct Actor {
    // ---
    transport_id: String,
    connection: Connection,
    channel: Channel,
    cmd_rx: mpsc::Receiver<Cmd>,
    subscribers: SubscriberMap,
    consumer_handles: HashMap<String, JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self) {
        // ---
        log_info!("[{}] AMQP actor started", self.transport_id);

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle_cmd(cmd).await;
        }

        log_info!("[{}] AMQP actor shutting down", self.transport_id);

        for (_, handle) in self.consumer_handles.drain() {
            handle.abort();
        }
        // Dropping the senders closes every subscriber inbox.
        self.subscribers.write().await.clear();

        if let Err(e) = self.channel.close(200, "Normal shutdown".into()).await {
            log_debug!("[{}] channel close: {e}", self.transport_id);
        }
        if let Err(e) = self.connection.close(200, "Normal shutdown".into()).await {
            log_debug!("[{}] connection close: {e}", self.transport_id);
        }

        log_info!("[{}] AMQP actor stopped", self.transport_id);
    }

    async fn handle_cmd(&mut self, cmd: Cmd) {
        // ---
        match cmd {
            Cmd::Publish { env, resp } => {
                let result = self.do_publish(env).await;
                let _ = resp.send(result);
            }
            Cmd::Subscribe { queue, inbox, resp } => {
                let result = self.do_subscribe(queue, inbox).await;
                let _ = resp.send(result);
            }
            Cmd::Close { resp } => {
                let _ = resp.send(Ok(()));
                self.cmd_rx.close();
            }
        }
    }

    async fn do_publish(&mut self, env: Envelope) -> Result<()> {
        // ---
        let properties = properties_for(&env);
        let queue = env.address.as_str();

        self.channel
            .basic_publish(
                "".into(),    // default exchange
                queue.into(), // routing key = queue name
                BasicPublishOptions::default(),
                &env.payload,
                properties,
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: publish failed: {e}")))?;

        log_debug!("[{}] Published to queue: {queue}", self.transport_id);
        Ok(())
    }

    async fn do_subscribe(
        &mut self,
        queue: Option<String>,
        inbox: mpsc::Sender<Envelope>,
    ) -> Result<String> {
        // ---
        let (requested, queue_opts) = match queue {
            Some(name) => (
                name,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: false,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
            ),
            None => (
                String::new(),
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
            ),
        };

        let declared = self
            .channel
            .queue_declare(&requested, queue_opts, FieldTable::default())
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: queue declare failed: {e}")))?;

        let queue = declared.name().as_str().to_string();
        log_info!("[{}] Declared queue: {queue}", self.transport_id);

        // Register before consuming so no delivery can miss the inbox.
        self.subscribers
            .write()
            .await
            .entry(queue.clone())
            .or_default()
            .push(inbox);

        if self.consumer_handles.contains_key(&queue) {
            log_debug!("[{}] Already consuming queue: {queue}", self.transport_id);
            return Ok(queue);
        }

        let consumer = self
            .channel
            .basic_consume(
                &queue,
                &format!("{}-{queue}", self.transport_id),
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: consume failed: {e}")))?;

        log_info!("[{}] Started consuming queue: {queue}", self.transport_id);

        let handle = tokio::spawn(consume(
            self.transport_id.clone(),
            queue.clone(),
            consumer,
            Arc::clone(&self.subscribers),
        ));
        self.consumer_handles.insert(queue.clone(), handle);

        Ok(queue)
    }
}

/// Pump deliveries from one broker consumer into the local inboxes.
async fn consume(
    transport_id: String,
    queue: String,
    mut consumer: Consumer,
    subscribers: SubscriberMap,
) {
    // ---
    use futures_lite::stream::StreamExt;

    while let Some(delivery) = consumer.next().await {
        let mut delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                log_error!("[{transport_id}] Consumer error on {queue}: {e}");
                break;
            }
        };

        log_trace!("[{transport_id}] Received message on queue: {queue}");

        let body = std::mem::take(&mut delivery.data);
        let envelope = envelope_from(&queue, body, &delivery.properties);

        // Clone the senders out so a slow inbox never holds the map lock.
        let senders = match subscribers.read().await.get(&queue) {
            Some(senders) => senders.clone(),
            None => continue,
        };
        for sender in senders {
            if sender.send(envelope.clone()).await.is_err() {
                log_debug!("[{transport_id}] Subscriber on {queue} went away");
            }
        }
    }

    // Closing the inboxes tells waiting clients the queue is gone.
    subscribers.write().await.remove(&queue);
    log_info!("[{transport_id}] Consumer task ended for queue: {queue}");
}

/// Basic properties carrying the envelope metadata.
fn properties_for(env: &Envelope) -> BasicProperties {
    // ---
    let mut properties = BasicProperties::default();

    if let Some(id) = &env.correlation_id {
        properties = properties.with_correlation_id(id.to_string().into());
    }
    if let Some(reply_to) = &env.reply_to {
        properties = properties.with_reply_to(reply_to.as_str().into());
    }
    if let Some(content_type) = &env.content_type {
        properties = properties.with_content_type(content_type.to_string().into());
    }

    properties
}

/// Rebuild an envelope from a delivery on `queue`.
fn envelope_from(queue: &str, body: Vec<u8>, properties: &BasicProperties) -> Envelope {
    // ---
    Envelope {
        address: Address::from(queue),
        payload: Bytes::from(body),
        correlation_id: properties
            .correlation_id()
            .as_ref()
            .map(|id| Arc::from(id.as_str())),
        reply_to: properties
            .reply_to()
            .as_ref()
            .map(|reply_to| Address::from(reply_to.as_str())),
        content_type: properties
            .content_type()
            .as_ref()
            .map(|content_type| Arc::from(content_type.as_str())),
    }
}

#[async_trait::async_trait]
impl Transport for AmqpTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn publish(&self, env: Envelope) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.send_cmd(Cmd::Publish { env, resp: tx }, rx).await
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        self.register(Some(sub.0.to_string())).await
    }

    async fn subscribe_ephemeral(&self) -> Result<SubscriptionHandle> {
        self.register(None).await
    }

    async fn close(&self) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();

        // The actor may already be gone; closing twice is not an error.
        if self.cmd_tx.send(Cmd::Close { resp: tx }).await.is_ok() {
            let _ = rx.await;
        }

        if let Some(handle) = self.actor.lock().await.take() {
            let _ = handle.await;
        }

        self.subscribers.write().await.clear();
        Ok(())
    }
}

/// Creates a lapin-based AMQP transport from the given configuration.
///
/// The connection and channel are opened before this returns.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] if the broker cannot be reached or the
/// channel cannot be opened.
pub async fn create_transport(config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    let (connection, channel) = create_amqp_connection(config).await?;
    Ok(AmqpTransport::create(config, connection, channel))
}

async fn create_amqp_connection(config: &RpcConfig) -> Result<(Connection, Channel)> {
    // ---
    let uri = config.transport_uri.as_str();

    log_info!("Connecting to AMQP broker: {uri}");

    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| {
            let msg = format!("amqp: connection failed: {e}");
            log_error!("{msg}");
            RpcError::Transport(msg)
        })?;

    log_info!("Connected to AMQP broker");

    let channel = connection.create_channel().await.map_err(|e| {
        let msg = format!("amqp: channel creation failed: {e}");
        log_error!("{msg}");
        RpcError::Transport(msg)
    })?;

    log_debug!("Created AMQP channel");

    Ok((connection, channel))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_request_metadata_becomes_properties() {
        // ---
        let env = Envelope::request(
            Address::from("running_queue"),
            Bytes::from_static(b"\x01"),
            Arc::from("c-1"),
            Address::from("amq.gen-xyz"),
            Arc::from("avro/binary"),
        );

        let properties = properties_for(&env);
        assert_eq!(
            properties.correlation_id().as_ref().map(|s| s.as_str()),
            Some("c-1")
        );
        assert_eq!(
            properties.reply_to().as_ref().map(|s| s.as_str()),
            Some("amq.gen-xyz")
        );
        assert_eq!(
            properties.content_type().as_ref().map(|s| s.as_str()),
            Some("avro/binary")
        );
    }

    #[test]
    fn test_delivery_becomes_envelope() {
        // ---
        let properties = BasicProperties::default()
            .with_correlation_id("c-2".into());

        let env = envelope_from("amq.gen-xyz", vec![7, 8], &properties);
        assert_eq!(env.address, Address::from("amq.gen-xyz"));
        assert_eq!(env.payload.as_ref(), &[7, 8]);
        assert_eq!(env.correlation_id.as_deref(), Some("c-2"));
        assert!(env.reply_to.is_none());
        assert!(env.content_type.is_none());
    }
}
