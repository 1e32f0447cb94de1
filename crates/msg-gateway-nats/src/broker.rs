//! NATS broker backend
//!
//! Core NATS carries fire-and-forget publishes, wildcard subscriptions and
//! request/reply. Durable streams and explicit-ack consumers go through
//! JetStream on the same connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_nats::client::RequestErrorKind;
use async_nats::jetstream::{
    self,
    consumer::pull::Config as ConsumerConfig,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    Context,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use msg_gateway::subject;
use msg_gateway::{
    AckToken, Broker, Error, InboundMessage, Result, StreamConsumer, StreamMessage, StreamSpec,
    Subscription,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

/// `Broker` backed by a NATS server
///
/// One connection serves both delivery models: plain subjects map to core
/// NATS, durable streams map to JetStream. Cloning is cheap and shares the
/// underlying connection.
///
/// # Example
///
/// ```rust,ignore
/// use msg_gateway::Gateway;
/// use msg_gateway_nats::NatsBroker;
///
/// let broker = NatsBroker::connect(&["nats://localhost:4222".into()]).await?;
/// Gateway::builder()
///     .broker(broker)
///     .routes(routes)
///     .build()?
///     .run()
///     .await
/// ```
#[derive(Clone)]
pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: Context,
    closed: Arc<AtomicBool>,
    ack_wait: Duration,
}

impl NatsBroker {
    /// Wrap an already connected client
    pub fn new(client: async_nats::Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            closed: Arc::new(AtomicBool::new(false)),
            ack_wait: DEFAULT_ACK_WAIT,
        }
    }

    /// Connect to one or more NATS servers
    pub async fn connect(urls: &[String]) -> Result<Self> {
        let addresses = urls.join(",");
        let client = async_nats::ConnectOptions::new()
            .name("msg-gateway")
            .connect(addresses.clone())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!(urls = %addresses, "Connected to NATS");
        Ok(Self::new(client))
    }

    /// Override the redelivery window for stream consumers
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

// A durable publish with no matching stream surfaces as a no-responders
// status on the internal ack request.
fn durable_publish_error(subject: &str, text: String) -> Error {
    if text.contains("no responders") || text.contains("no stream") {
        Error::Routing(subject.to_string())
    } else {
        Error::Connection(text)
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()> {
        self.ensure_open()?;

        match self.jetstream.get_stream(&spec.name).await {
            Ok(mut stream) => {
                let info = stream
                    .info()
                    .await
                    .map_err(|e| Error::Connection(format!("Failed to get stream info: {e}")))?;

                let mut existing = info.config.subjects.clone();
                let mut wanted = spec.subjects.clone();
                existing.sort();
                wanted.sort();

                if existing != wanted || info.config.max_messages != spec.max_messages.unwrap_or(-1)
                {
                    return Err(Error::ConfigConflict(spec.name.clone()));
                }

                debug!(stream = %spec.name, "Stream already exists");
                Ok(())
            }
            Err(_) => {
                self.jetstream
                    .create_stream(StreamConfig {
                        name: spec.name.clone(),
                        subjects: spec.subjects.clone(),
                        retention: RetentionPolicy::Limits,
                        storage: StorageType::File,
                        max_messages: spec.max_messages.unwrap_or(-1),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| {
                        let text = e.to_string();
                        // Lost a create race against a differently configured stream
                        if text.contains("already in use") {
                            Error::ConfigConflict(spec.name.clone())
                        } else {
                            Error::Connection(format!("Failed to create stream: {text}"))
                        }
                    })?;

                info!(stream = %spec.name, subjects = ?spec.subjects, "Stream created");
                Ok(())
            }
        }
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(Error::Subject(subject.to_string()));
        }

        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn publish_durable(&self, subject: &str, payload: Bytes) -> Result<u64> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(Error::Subject(subject.to_string()));
        }

        let ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| durable_publish_error(subject, e.to_string()))?
            .await
            .map_err(|e| durable_publish_error(subject, e.to_string()))?;

        Ok(ack.sequence)
    }

    async fn request(&self, subject: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(Error::Subject(subject.to_string()));
        }

        match tokio::time::timeout(timeout, self.client.request(subject.to_string(), payload)).await
        {
            Ok(Ok(reply)) => Ok(reply.payload),
            Ok(Err(e)) => match e.kind() {
                RequestErrorKind::TimedOut | RequestErrorKind::NoResponders => {
                    Err(Error::Timeout(timeout))
                }
                _ => Err(Error::Connection(e.to_string())),
            },
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription> {
        self.ensure_open()?;
        if !subject::is_valid_pattern(pattern) {
            return Err(Error::Subject(pattern.to_string()));
        }

        let mut subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let subject_pattern = pattern.to_string();
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let mut inbound =
                    InboundMessage::new(message.subject.to_string(), message.payload);
                if let Some(reply) = message.reply {
                    inbound = inbound.with_reply(reply.to_string());
                }
                // Receiver dropped means the subscription handle is gone
                if sender.send(inbound).await.is_err() {
                    break;
                }
            }
            debug!(subject = %subject_pattern, "Subscription relay stopped");
        });

        Ok(Subscription::new(pattern, receiver))
    }

    async fn consume(&self, stream: &str, consumer: &str) -> Result<StreamConsumer> {
        self.ensure_open()?;

        let js_stream = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| Error::Broker(anyhow::anyhow!("stream '{stream}' not found: {e}")))?;

        let pull = js_stream
            .create_consumer(ConsumerConfig {
                durable_name: Some(consumer.to_string()),
                deliver_policy: jetstream::consumer::DeliverPolicy::All,
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ack_wait: self.ack_wait,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Connection(format!("Failed to create consumer: {e}")))?;

        let mut messages = pull
            .messages()
            .await
            .map_err(|e| Error::Connection(format!("Failed to get message stream: {e}")))?;

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let stream_name = stream.to_string();
        let consumer_name = consumer.to_string();
        tokio::spawn(async move {
            while let Some(next) = messages.next().await {
                let message = match next {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(stream = %stream_name, error = %e, "Failed to receive message");
                        continue;
                    }
                };

                let sequence = match message.info() {
                    Ok(info) => info.stream_sequence,
                    Err(e) => {
                        warn!(stream = %stream_name, error = %e, "Missing delivery info");
                        0
                    }
                };

                let delivery = StreamMessage::new(
                    message.subject.to_string(),
                    message.payload.clone(),
                    sequence,
                    Arc::new(NatsAck { message }),
                );
                if sender.send(delivery).await.is_err() {
                    break;
                }
            }
            debug!(stream = %stream_name, consumer = %consumer_name, "Consumer relay stopped");
        });

        Ok(StreamConsumer::new(stream, receiver))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Push out anything still buffered before the connection drops
        self.client
            .flush()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!("NATS connection closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "NATS"
    }
}

/// Ack handle wrapping a JetStream delivery
struct NatsAck {
    message: jetstream::Message,
}

#[async_trait]
impl AckToken for NatsAck {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}
