//! Message types delivered by broker subscriptions and stream consumers

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Message delivered to a subject subscription
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Subject the message was published on
    pub subject: String,
    /// Opaque payload bytes (usually UTF-8 JSON)
    pub payload: Bytes,
    /// Reply subject for request/reply traffic. None for plain publishes.
    pub reply: Option<String>,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            reply: None,
        }
    }

    /// Set the reply subject
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }
}

/// Acknowledgment handle attached to a stream message
///
/// Backends implement this to report a message as processed; unacknowledged
/// messages are redelivered after the broker's ack-wait window.
#[async_trait]
pub trait AckToken: Send + Sync {
    /// Mark the message as processed
    async fn ack(&self) -> Result<()>;
}

/// Message delivered from a durable stream consumer
pub struct StreamMessage {
    /// Subject the message was published on
    pub subject: String,
    /// Opaque payload bytes
    pub payload: Bytes,
    /// Broker-assigned stream sequence number
    pub sequence: u64,
    acker: Arc<dyn AckToken>,
}

impl StreamMessage {
    /// Create a stream message. Called by broker backends when relaying
    /// deliveries into a consumer channel.
    pub fn new(
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
        sequence: u64,
        acker: Arc<dyn AckToken>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            sequence,
            acker,
        }
    }

    /// Acknowledge the message so the broker will not redeliver it
    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }
}

impl std::fmt::Debug for StreamMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMessage")
            .field("subject", &self.subject)
            .field("sequence", &self.sequence)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
