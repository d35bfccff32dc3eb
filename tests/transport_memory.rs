// tests/transport_memory.rs

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use runner_rpc::{
    // ---
    create_memory_transport_with_hub,
    Address,
    CorrelationId,
    Envelope,
    MemoryHub,
    RpcConfig,
};

#[tokio::test]
async fn memory_request_reaches_queue_with_metadata() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let config = RpcConfig::memory("mrq");
    let transport = create_memory_transport_with_hub(&config, hub)
        .await
        .expect("failed to create memory transport");

    let queue = Address::from("running_queue");
    let mut sub = transport
        .subscribe(queue.clone().into())
        .await
        .expect("subscribe failed");
    let reply = transport
        .subscribe_ephemeral()
        .await
        .expect("ephemeral subscribe failed");

    let payload = Bytes::from_static(b"\x02");
    let correlation_id = CorrelationId::generate();

    let env = Envelope::request(
        queue.clone(),
        payload.clone(),
        correlation_id.as_shared(),
        reply.address.clone(),
        Arc::from("avro/binary"),
    );

    // ---
    // Act
    // ---
    transport.publish(env).await.expect("publish failed");

    // ---
    // Assert
    // ---
    let received = timeout(Duration::from_millis(100), sub.inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription channel closed unexpectedly");

    assert_eq!(received.payload, payload);
    assert_eq!(received.address, queue);
    assert_eq!(received.correlation_id.as_deref(), Some(correlation_id.as_str()));
    assert_eq!(received.reply_to, Some(reply.address));
}

#[tokio::test]
async fn memory_publish_without_consumer_is_dropped() {
    // ---
    let hub = MemoryHub::new();
    let transport = create_memory_transport_with_hub(&RpcConfig::memory("nobody"), hub)
        .await
        .unwrap();

    let env = Envelope::response(
        Address::from("amq.gen-gone"),
        Bytes::new(),
        Arc::from("c-1"),
        Arc::from("avro/binary"),
    );

    assert!(transport.publish(env).await.is_ok());
}
