//! In-process broker implementation
//!
//! `MemoryBroker` implements the full `Broker` contract without an external
//! server: wildcard subject routing, durable streams with sequence numbers,
//! explicit acknowledgment with one redelivery per missed ack window, and
//! inbox-based request/reply. Used by the test suites and by running the
//! gateway in test mode.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};

use crate::broker::{Broker, StreamConsumer, StreamSpec, Subscription};
use crate::error::{Error, Result};
use crate::message::{AckToken, InboundMessage, StreamMessage};
use crate::subject;

const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

/// In-process `Broker` for tests and brokerless runs
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    streams: DashMap<String, MemoryStream>,
    subscriptions: DashMap<u64, SubjectSubscription>,
    next_subscription_id: AtomicU64,
    closed: AtomicBool,
    ack_wait: Duration,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            streams: DashMap::new(),
            subscriptions: DashMap::new(),
            next_subscription_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            ack_wait: DEFAULT_ACK_WAIT,
        }
    }
}

#[derive(Debug)]
struct SubjectSubscription {
    pattern: String,
    sender: mpsc::Sender<InboundMessage>,
}

#[derive(Debug)]
struct MemoryStream {
    spec: StreamSpec,
    messages: Vec<StoredMessage>,
    last_sequence: u64,
    /// Bumped to the newest sequence on every append; consumer feeds wait on it
    tail: watch::Sender<u64>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    sequence: u64,
    subject: String,
    payload: Bytes,
}

struct MemoryAck {
    acked: Arc<AtomicBool>,
}

#[async_trait]
impl AckToken for MemoryAck {
    async fn ack(&self) -> Result<()> {
        self.acked.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl MemoryBroker {
    /// Create a broker with the default 30s ack window
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker with a custom ack window (short windows make
    /// redelivery observable in tests)
    pub fn with_ack_wait(ack_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ack_wait,
                ..Inner::default()
            }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Deliver a message to every subscription whose pattern matches.
    /// Delivery is at-most-once: a full channel (slow consumer) drops the
    /// message, a closed channel prunes the subscription.
    fn fan_out(&self, subject: &str, payload: &Bytes, reply: Option<&str>) {
        let mut targets = Vec::new();
        for entry in self.inner.subscriptions.iter() {
            if subject::matches(&entry.pattern, subject) {
                targets.push((*entry.key(), entry.sender.clone()));
            }
        }

        let mut dead = Vec::new();
        for (id, sender) in targets {
            let mut message = InboundMessage::new(subject, payload.clone());
            if let Some(reply) = reply {
                message = message.with_reply(reply);
            }
            match sender.try_send(message) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(subject = %subject, "Subscriber lagging, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }
        for id in dead {
            self.inner.subscriptions.remove(&id);
        }
    }

    fn register_subscription(&self, pattern: &str) -> (u64, mpsc::Receiver<InboundMessage>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscriptions.insert(
            id,
            SubjectSubscription {
                pattern: pattern.to_string(),
                sender,
            },
        );
        (id, receiver)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()> {
        self.ensure_open()?;
        for pattern in &spec.subjects {
            if !subject::is_valid_pattern(pattern) {
                return Err(Error::Subject(pattern.clone()));
            }
        }

        match self.inner.streams.entry(spec.name.clone()) {
            Entry::Occupied(entry) => {
                let current = &entry.get().spec;
                let mut existing = current.subjects.clone();
                let mut wanted = spec.subjects.clone();
                existing.sort();
                wanted.sort();

                if existing == wanted && current.max_messages == spec.max_messages {
                    Ok(())
                } else {
                    Err(Error::ConfigConflict(spec.name.clone()))
                }
            }
            Entry::Vacant(slot) => {
                let (tail, _) = watch::channel(0u64);
                slot.insert(MemoryStream {
                    spec: spec.clone(),
                    messages: Vec::new(),
                    last_sequence: 0,
                    tail,
                });
                Ok(())
            }
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(Error::Subject(subject.to_string()));
        }
        self.fan_out(subject, &payload, None);
        Ok(())
    }

    async fn publish_durable(&self, subject: &str, payload: Bytes) -> Result<u64> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(Error::Subject(subject.to_string()));
        }

        let target = self.inner.streams.iter().find_map(|entry| {
            entry
                .spec
                .matches_subject(subject)
                .then(|| entry.key().clone())
        });
        let Some(name) = target else {
            return Err(Error::Routing(subject.to_string()));
        };

        let sequence = {
            let mut stream = self
                .inner
                .streams
                .get_mut(&name)
                .ok_or(Error::ConnectionClosed)?;
            stream.last_sequence += 1;
            let sequence = stream.last_sequence;
            stream.messages.push(StoredMessage {
                sequence,
                subject: subject.to_string(),
                payload: payload.clone(),
            });
            if let Some(max) = stream.spec.max_messages {
                if max > 0 && stream.messages.len() > max as usize {
                    let excess = stream.messages.len() - max as usize;
                    stream.messages.drain(..excess);
                }
            }
            stream.tail.send_replace(sequence);
            sequence
        };

        // A stream publish is also a plain publish on the subject
        self.fan_out(subject, &payload, None);
        Ok(sequence)
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(Error::Subject(subject.to_string()));
        }

        let inbox = format!("_INBOX.{}", uuid::Uuid::new_v4().simple());
        let (id, mut receiver) = self.register_subscription(&inbox);

        self.fan_out(subject, &payload, Some(&inbox));

        let reply = tokio::time::timeout(timeout, receiver.recv()).await;
        self.inner.subscriptions.remove(&id);

        match reply {
            Ok(Some(message)) => Ok(message.payload),
            Ok(None) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        self.ensure_open()?;
        if !subject::is_valid_pattern(subject) {
            return Err(Error::Subject(subject.to_string()));
        }
        let (_, receiver) = self.register_subscription(subject);
        Ok(Subscription::new(subject, receiver))
    }

    async fn consume(&self, stream: &str, consumer: &str) -> Result<StreamConsumer> {
        self.ensure_open()?;
        let mut tail = {
            let entry = self
                .inner
                .streams
                .get(stream)
                .ok_or_else(|| Error::Broker(anyhow::anyhow!("stream not found: {stream}")))?;
            entry.tail.subscribe()
        };

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let inner = self.inner.clone();
        let stream_name = stream.to_string();
        let consumer_name = consumer.to_string();
        let ack_wait = self.inner.ack_wait;

        tokio::spawn(async move {
            let mut next_sequence = 1u64;
            loop {
                let batch: Vec<StoredMessage> = match inner.streams.get(&stream_name) {
                    Some(entry) => entry
                        .messages
                        .iter()
                        .filter(|m| m.sequence >= next_sequence)
                        .cloned()
                        .collect(),
                    // Stream dropped, broker closed
                    None => break,
                };

                if batch.is_empty() {
                    if tail.changed().await.is_err() {
                        break;
                    }
                    continue;
                }

                for message in batch {
                    next_sequence = message.sequence + 1;
                    if !deliver(&sender, message, ack_wait).await {
                        tracing::debug!(
                            stream = %stream_name,
                            consumer = %consumer_name,
                            "Consumer handle dropped"
                        );
                        return;
                    }
                }
            }
            tracing::debug!(
                stream = %stream_name,
                consumer = %consumer_name,
                "Consumer feed stopped"
            );
        });

        Ok(StreamConsumer::new(stream, receiver))
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.subscriptions.clear();
        self.inner.streams.clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// Send one delivery into the consumer channel and schedule a single
/// redelivery for when the ack window lapses unacknowledged.
async fn deliver(
    sender: &mpsc::Sender<StreamMessage>,
    message: StoredMessage,
    ack_wait: Duration,
) -> bool {
    let acked = Arc::new(AtomicBool::new(false));
    let delivery = StreamMessage::new(
        message.subject.clone(),
        message.payload.clone(),
        message.sequence,
        Arc::new(MemoryAck {
            acked: acked.clone(),
        }),
    );
    if sender.send(delivery).await.is_err() {
        return false;
    }

    let sender = sender.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ack_wait).await;
        if acked.load(Ordering::SeqCst) {
            return;
        }
        let redelivery = StreamMessage::new(
            message.subject,
            message.payload,
            message.sequence,
            Arc::new(MemoryAck { acked }),
        );
        let _ = sender.send(redelivery).await;
    });
    true
}
