//! Gateway builder and runner

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::broker::{Broker, StreamSpec};
use crate::handler::{self, GatewayState};
use crate::memory::MemoryBroker;
use crate::subject;

/// Subjects the HTTP endpoints and background tasks are wired to
#[derive(Debug, Clone)]
pub struct SubjectRoutes {
    /// Subject durable publishes are routed to
    pub stream_subject: String,
    /// Subject fire-and-forget publishes go out on
    pub publish_subject: String,
    /// Subject targeted by the request endpoint
    pub request_subject: String,
    /// Wildcard pattern served by the built-in greeting responder
    pub responder_pattern: Option<String>,
    /// Subject watched and logged by the subscription task
    pub watch_subject: Option<String>,
}

impl SubjectRoutes {
    /// Route table with no responder or watcher
    pub fn new(
        stream_subject: impl Into<String>,
        publish_subject: impl Into<String>,
        request_subject: impl Into<String>,
    ) -> Self {
        Self {
            stream_subject: stream_subject.into(),
            publish_subject: publish_subject.into(),
            request_subject: request_subject.into(),
            responder_pattern: None,
            watch_subject: None,
        }
    }

    /// Serve greeting replies on a wildcard pattern
    pub fn with_responder(mut self, pattern: impl Into<String>) -> Self {
        self.responder_pattern = Some(pattern.into());
        self
    }

    /// Log every message published on a subject
    pub fn with_watch(mut self, subject: impl Into<String>) -> Self {
        self.watch_subject = Some(subject.into());
        self
    }
}

/// Build the gateway router over the given state
pub fn router<B: Broker>(state: GatewayState<B>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ready", get(|| async { "READY" }))
        .route("/nats/publish-stream", post(handler::publish_stream::<B>))
        .route("/nats/publish", post(handler::publish::<B>))
        .route("/nats/request", post(handler::request::<B>))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Gateway configuration and runner
#[derive(Debug)]
pub struct Gateway<B: Broker> {
    port: u16,
    broker: Arc<B>,
    stream: Option<StreamSpec>,
    consumer_name: String,
    routes: SubjectRoutes,
    request_timeout: Duration,
}

impl<B: Broker> Gateway<B> {
    /// Run the gateway server
    ///
    /// Broker setup (stream declaration, subscriptions, the stream
    /// consumer) completes before the HTTP listener binds, so no request
    /// is accepted against a half-initialized adapter.
    pub async fn run(self) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();

        tracing::info!(
            port = self.port,
            broker = self.broker.name(),
            "Starting gateway"
        );

        if let Some(spec) = &self.stream {
            self.broker.ensure_stream(spec).await?;
            tracing::info!(stream = %spec.name, subjects = ?spec.subjects, "Stream declared");
        }

        // Greeting responder: answers request/reply traffic on the pattern
        if let Some(pattern) = self.routes.responder_pattern.clone() {
            let mut sub = self.broker.subscribe(&pattern).await?;
            let broker = self.broker.clone();
            let responder_cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = responder_cancel.cancelled() => break,
                        msg = sub.recv() => {
                            let Some(msg) = msg else { break };
                            let Some(reply) = msg.reply else { continue };
                            let name = subject::wildcard_suffix(&pattern, &msg.subject)
                                .unwrap_or(&msg.subject)
                                .to_string();
                            tracing::debug!(subject = %msg.subject, reply = %reply, "Answering request");
                            let body = serde_json::Value::String(name).to_string();
                            if let Err(e) = broker.publish(&reply, body.into()).await {
                                tracing::warn!(subject = %msg.subject, error = %e, "Reply failed");
                            }
                        }
                    }
                }
                tracing::info!("Responder task stopped");
            });
        }

        // Subscription watcher: logs everything published on the subject
        if let Some(watch_subject) = self.routes.watch_subject.clone() {
            let mut sub = self.broker.subscribe(&watch_subject).await?;
            let watcher_cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = watcher_cancel.cancelled() => break,
                        msg = sub.recv() => {
                            match msg {
                                Some(msg) => tracing::info!(
                                    subject = %msg.subject,
                                    data = %String::from_utf8_lossy(&msg.payload),
                                    "Subscription message"
                                ),
                                None => break,
                            }
                        }
                    }
                }
                tracing::info!("Watcher task stopped");
            });
        }

        // Stream worker: consumes the durable stream, logs and acks.
        // Redeliveries are processed like any delivery; no deduplication.
        if let Some(spec) = &self.stream {
            let mut consumer = self.broker.consume(&spec.name, &self.consumer_name).await?;
            let worker_cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = worker_cancel.cancelled() => break,
                        msg = consumer.recv() => {
                            let Some(msg) = msg else { break };
                            tracing::info!(
                                sequence = msg.sequence,
                                data = %String::from_utf8_lossy(&msg.payload),
                                "Stream message"
                            );
                            if let Err(e) = msg.ack().await {
                                tracing::warn!(sequence = msg.sequence, error = %e, "Ack failed");
                            }
                        }
                    }
                }
                tracing::info!("Stream worker stopped");
            });
        }

        let state = GatewayState {
            broker: self.broker.clone(),
            routes: Arc::new(self.routes.clone()),
            request_timeout: self.request_timeout,
        };
        let app = router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        let cancel_for_shutdown = cancel.clone();
        let shutdown_signal = async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("Received Ctrl+C"),
                _ = terminate => tracing::info!("Received SIGTERM"),
            }

            cancel_for_shutdown.cancel();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        cancel.cancel();
        if let Err(e) = self.broker.close().await {
            tracing::warn!(error = %e, "Broker close failed");
        }

        tracing::info!("Gateway shutdown complete");
        Ok(())
    }
}

/// Builder for Gateway
pub struct GatewayBuilder<B = MemoryBroker> {
    port: u16,
    broker: Option<B>,
    stream: Option<StreamSpec>,
    consumer_name: String,
    routes: Option<SubjectRoutes>,
    request_timeout: Duration,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            port: 8080,
            broker: None,
            stream: None,
            consumer_name: "gateway".to_string(),
            routes: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl Gateway<MemoryBroker> {
    /// Create a new gateway builder
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }
}

impl<B> GatewayBuilder<B> {
    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the broker backend
    pub fn broker<B2: Broker>(self, broker: B2) -> GatewayBuilder<B2> {
        GatewayBuilder {
            port: self.port,
            broker: Some(broker),
            stream: self.stream,
            consumer_name: self.consumer_name,
            routes: self.routes,
            request_timeout: self.request_timeout,
        }
    }

    /// Declare a stream at startup and consume it with the stream worker
    pub fn stream(mut self, spec: StreamSpec) -> Self {
        self.stream = Some(spec);
        self
    }

    /// Name the durable stream consumer
    pub fn consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    /// Set the subject route table
    pub fn routes(mut self, routes: SubjectRoutes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Set the deadline for request/reply calls
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl<B: Broker> GatewayBuilder<B> {
    /// Build the gateway
    pub fn build(self) -> anyhow::Result<Gateway<B>> {
        let broker = self
            .broker
            .ok_or_else(|| anyhow::anyhow!("Broker is required"))?;
        let routes = self
            .routes
            .ok_or_else(|| anyhow::anyhow!("Subject routes are required"))?;

        Ok(Gateway {
            port: self.port,
            broker: Arc::new(broker),
            stream: self.stream,
            consumer_name: self.consumer_name,
            routes,
            request_timeout: self.request_timeout,
        })
    }
}
