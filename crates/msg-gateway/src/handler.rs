//! HTTP handlers for the message gateway

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;

use crate::broker::Broker;
use crate::gateway::SubjectRoutes;

/// Shared state for handlers
///
/// The broker is an explicitly constructed adapter shared by reference; no
/// process-wide singletons.
pub struct GatewayState<B: Broker> {
    pub broker: Arc<B>,
    pub routes: Arc<SubjectRoutes>,
    pub request_timeout: Duration,
}

impl<B: Broker> Clone for GatewayState<B> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            routes: self.routes.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

/// Durable publish endpoint: forwards the JSON body into the stream path
pub async fn publish_stream<B: Broker>(
    State(state): State<GatewayState<B>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let subject = &state.routes.stream_subject;
    let payload = Bytes::from(body.to_string());

    match state.broker.publish_durable(subject, payload).await {
        Ok(sequence) => {
            tracing::info!(subject = %subject, sequence, "Published to stream");
            (StatusCode::OK, "stream published").into_response()
        }
        Err(e) => {
            tracing::error!(subject = %subject, error = %e, "Stream publish failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Fire-and-forget publish endpoint
pub async fn publish<B: Broker>(
    State(state): State<GatewayState<B>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let subject = &state.routes.publish_subject;
    let payload = Bytes::from(body.to_string());

    match state.broker.publish(subject, payload).await {
        Ok(()) => {
            tracing::info!(subject = %subject, "Published");
            (StatusCode::OK, "data published successfully.").into_response()
        }
        Err(e) => {
            tracing::error!(subject = %subject, error = %e, "Publish failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Request/reply endpoint: no body, returns the decoded reply text
pub async fn request<B: Broker>(State(state): State<GatewayState<B>>) -> Response {
    let subject = &state.routes.request_subject;

    match state
        .broker
        .request(subject, Bytes::new(), state.request_timeout)
        .await
    {
        Ok(reply) => {
            let text = String::from_utf8_lossy(&reply).into_owned();
            tracing::info!(subject = %subject, reply = %text, "Request answered");
            (StatusCode::OK, text).into_response()
        }
        Err(e) => {
            tracing::error!(subject = %subject, error = %e, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
