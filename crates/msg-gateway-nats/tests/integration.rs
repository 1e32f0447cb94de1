//! Integration tests against a live NATS server with JetStream.
//!
//! Start a server with `nats-server -js`, then run:
//! `cargo test -p msg-gateway-nats -- --ignored`
//!
//! Point at a non-default server with the `NATS_URL` environment variable.

use std::time::Duration;

use bytes::Bytes;
use msg_gateway::{Broker, Error, StreamSpec};
use msg_gateway_nats::NatsBroker;

fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

async fn connect() -> NatsBroker {
    NatsBroker::connect(&[nats_url()])
        .await
        .expect("Failed to connect to NATS")
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "Requires NATS with JetStream"]
async fn stream_publish_consume_roundtrip() {
    let broker = connect().await;
    let name = unique("it-stream");
    let spec = StreamSpec::new(name.clone(), [format!("{name}.*")]);
    broker.ensure_stream(&spec).await.unwrap();

    let first = broker
        .publish_durable(&format!("{name}.a"), Bytes::from_static(b"{\"n\":1}"))
        .await
        .unwrap();
    let second = broker
        .publish_durable(&format!("{name}.b"), Bytes::from_static(b"{\"n\":2}"))
        .await
        .unwrap();
    assert!(second > first);

    let mut consumer = broker.consume(&name, &unique("worker")).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), consumer.recv())
        .await
        .expect("timed out waiting for first delivery")
        .expect("consumer channel closed");
    assert_eq!(msg.sequence, first);
    assert_eq!(&msg.payload[..], b"{\"n\":1}");
    msg.ack().await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), consumer.recv())
        .await
        .expect("timed out waiting for second delivery")
        .expect("consumer channel closed");
    assert_eq!(msg.sequence, second);
    assert_eq!(&msg.subject, &format!("{name}.b"));
    msg.ack().await.unwrap();
}

#[tokio::test]
#[ignore = "Requires NATS with JetStream"]
async fn ensure_stream_is_idempotent_and_rejects_drift() {
    let broker = connect().await;
    let name = unique("it-ensure");
    let spec = StreamSpec::new(name.clone(), [format!("{name}.*")]);

    broker.ensure_stream(&spec).await.unwrap();
    broker.ensure_stream(&spec).await.unwrap();

    let drifted = StreamSpec::new(name.clone(), [format!("{name}.other")]);
    let err = broker.ensure_stream(&drifted).await.unwrap_err();
    assert!(matches!(err, Error::ConfigConflict(n) if n == name));
}

#[tokio::test]
#[ignore = "Requires NATS with JetStream"]
async fn durable_publish_without_stream_is_rejected() {
    let broker = connect().await;
    let subject = unique("it-nostream");

    let err = broker
        .publish_durable(&subject, Bytes::from_static(b"{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Routing(_)), "got {err:?}");
}

#[tokio::test]
#[ignore = "Requires NATS"]
async fn subscribe_receives_core_publish() {
    let broker = connect().await;
    let root = unique("it-sub");

    let mut subscription = broker.subscribe(&format!("{root}.*")).await.unwrap();
    // Give the server a moment to register interest
    tokio::time::sleep(Duration::from_millis(100)).await;

    broker
        .publish(&format!("{root}.hello"), Bytes::from_static(b"hi"))
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription channel closed");
    assert_eq!(msg.subject, format!("{root}.hello"));
    assert_eq!(&msg.payload[..], b"hi");
    assert!(msg.reply.is_none());
}

#[tokio::test]
#[ignore = "Requires NATS"]
async fn request_reply_roundtrip() {
    let broker = connect().await;
    let subject = unique("it-req");

    let responder = connect().await;
    let mut subscription = responder.subscribe(&subject).await.unwrap();
    tokio::spawn(async move {
        while let Some(msg) = subscription.recv().await {
            if let Some(reply) = msg.reply {
                let _ = responder.publish(&reply, Bytes::from_static(b"pong")).await;
            }
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reply = broker
        .request(&subject, Bytes::from_static(b"ping"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"pong");
}

#[tokio::test]
#[ignore = "Requires NATS"]
async fn request_without_responder_times_out() {
    let broker = connect().await;
    let timeout = Duration::from_millis(500);

    let err = broker
        .request(&unique("it-void"), Bytes::from_static(b"ping"), timeout)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
}

#[tokio::test]
#[ignore = "Requires NATS"]
async fn closed_broker_rejects_operations() {
    let broker = connect().await;
    broker.close().await.unwrap();
    broker.close().await.unwrap();

    let err = broker
        .publish("anything", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}
