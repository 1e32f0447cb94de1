//! Broker trait and subscription handles
//!
//! Implement `Broker` to plug in a messaging backend. The gateway owns a
//! single broker instance for the process lifetime and shares it across
//! HTTP handlers and background tasks.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::{InboundMessage, StreamMessage};
use crate::subject;

/// Declarative definition of a durable stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Stream name
    pub name: String,
    /// Subject patterns the stream captures
    pub subjects: Vec<String>,
    /// Retention limit in messages. None means unlimited.
    #[serde(default)]
    pub max_messages: Option<i64>,
}

impl StreamSpec {
    /// Create a stream spec with unlimited retention
    pub fn new<S, I>(name: impl Into<String>, subjects: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Self {
            name: name.into(),
            subjects: subjects.into_iter().map(Into::into).collect(),
            max_messages: None,
        }
    }

    /// Cap retention at a message count
    pub fn with_max_messages(mut self, max: i64) -> Self {
        self.max_messages = Some(max);
        self
    }

    /// Whether any of the stream's subject patterns captures the subject
    pub fn matches_subject(&self, subject: &str) -> bool {
        self.subjects
            .iter()
            .any(|pattern| subject::matches(pattern, subject))
    }
}

/// Handle to an active subject subscription
///
/// Messages arrive through an internal channel fed by a backend relay task.
/// Dropping the handle tears the relay down and unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    receiver: mpsc::Receiver<InboundMessage>,
}

impl Subscription {
    /// Wrap a receiver fed by a backend relay task
    pub fn new(subject: impl Into<String>, receiver: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            subject: subject.into(),
            receiver,
        }
    }

    /// Receive the next message. Returns None once the relay has stopped.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    /// Subject pattern this subscription covers
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Handle to a durable stream consumer
///
/// Yields messages in non-decreasing sequence order; each message carries an
/// acknowledgment handle. Unacknowledged messages come back after the
/// backend's ack-wait window.
#[derive(Debug)]
pub struct StreamConsumer {
    stream: String,
    receiver: mpsc::Receiver<StreamMessage>,
}

impl StreamConsumer {
    /// Wrap a receiver fed by a backend relay task
    pub fn new(stream: impl Into<String>, receiver: mpsc::Receiver<StreamMessage>) -> Self {
        Self {
            stream: stream.into(),
            receiver,
        }
    }

    /// Receive the next stream message. Returns None once the relay has stopped.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.receiver.recv().await
    }

    /// Name of the stream being consumed
    pub fn stream(&self) -> &str {
        &self.stream
    }
}

/// Trait for messaging backends
///
/// A broker owns one long-lived connection. All methods are safe to call
/// concurrently through a shared reference; after `close()` every operation
/// fails with `Error::ConnectionClosed`.
///
/// # Example
///
/// ```rust,ignore
/// use msg_gateway::{Broker, StreamSpec, Subscription, StreamConsumer, Result};
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// struct MyBroker {
///     // connection handle, closed flag, ...
/// }
///
/// #[async_trait]
/// impl Broker for MyBroker {
///     async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()> {
///         // look up the stream, create it if absent, reject config drift
///         Ok(())
///     }
///
///     async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
///         // hand the payload to the transport and return
///         Ok(())
///     }
///
///     // ... remaining methods
/// #   async fn publish_durable(&self, _: &str, _: Bytes) -> Result<u64> { Ok(0) }
/// #   async fn request(&self, _: &str, _: Bytes, _: Duration) -> Result<Bytes> { Ok(Bytes::new()) }
/// #   async fn subscribe(&self, _: &str) -> Result<Subscription> { unimplemented!() }
/// #   async fn consume(&self, _: &str, _: &str) -> Result<StreamConsumer> { unimplemented!() }
/// #   async fn close(&self) -> Result<()> { Ok(()) }
///
///     fn name(&self) -> &'static str { "MyBroker" }
/// }
/// ```
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Idempotently declare a durable stream.
    ///
    /// Succeeds silently when the stream already exists with a matching
    /// configuration; fails with `Error::ConfigConflict` when it differs.
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()>;

    /// Fire-and-forget publish to current subscribers of the subject.
    ///
    /// Resolves once the payload is handed to the transport. Delivery is
    /// not confirmed; with no subscribers the message is silently dropped.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Durable publish through a declared stream.
    ///
    /// Requires a stream whose subject patterns capture the subject, else
    /// fails with `Error::Routing`. Resolves with the assigned stream
    /// sequence once the broker has persisted the message.
    async fn publish_durable(&self, subject: &str, payload: Bytes) -> Result<u64>;

    /// Send a request and wait for exactly one reply on an ephemeral inbox.
    ///
    /// Fails with `Error::Timeout` when no reply arrives within the
    /// deadline.
    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;

    /// Subscribe to a subject pattern (wildcards allowed).
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;

    /// Attach a durable consumer to a named stream.
    async fn consume(&self, stream: &str, consumer: &str) -> Result<StreamConsumer>;

    /// Close the connection. Idempotent; subsequent operations fail with
    /// `Error::ConnectionClosed`.
    async fn close(&self) -> Result<()>;

    /// Return the backend name (for logging)
    fn name(&self) -> &'static str;
}
