//! # Message Gateway
//!
//! A small HTTP gateway library over a pluggable message broker.
//!
//! ## Features
//!
//! - **Pluggable Backends**: Implement `Broker` to connect any messaging system
//! - **Three Messaging Patterns**: Durable stream publish with sequence
//!   acknowledgment, fire-and-forget publish/subscribe, and request/reply
//!   with a deadline
//! - **Channel-based Subscriptions**: Subscriptions and stream consumers are
//!   explicit handles fed by relay tasks, so shutdown is structured rather
//!   than callback-driven
//! - **Built-in Server**: Optional Axum-based HTTP server exposing the
//!   publish and request endpoints
//! - **In-process Broker**: `MemoryBroker` implements the full contract for
//!   tests and brokerless runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use msg_gateway::{Gateway, MemoryBroker, StreamSpec, SubjectRoutes};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Gateway::builder()
//!         .port(8080)
//!         .broker(MemoryBroker::new())
//!         .stream(StreamSpec::new("orders", ["orders.*"]))
//!         .routes(
//!             SubjectRoutes::new("orders.a", "events", "greet.joe")
//!                 .with_responder("greet.*")
//!                 .with_watch("events"),
//!         )
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Custom Backend
//!
//! ```rust,ignore
//! use msg_gateway::{Broker, StreamSpec, Subscription, StreamConsumer, Result};
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! struct MyBroker { /* connection handle */ }
//!
//! #[async_trait]
//! impl Broker for MyBroker {
//!     async fn subscribe(&self, subject: &str) -> Result<Subscription> {
//!         let (tx, rx) = tokio::sync::mpsc::channel(256);
//!         // spawn a relay task forwarding transport messages into tx
//!         Ok(Subscription::new(subject, rx))
//!     }
//!
//!     // ... remaining methods
//!
//!     fn name(&self) -> &'static str { "MyBroker" }
//! }
//! ```

pub mod broker;
pub mod subject;

mod error;
mod memory;
mod message;

#[cfg(feature = "server")]
mod gateway;
#[cfg(feature = "server")]
mod handler;

// Re-exports
pub use broker::{Broker, StreamConsumer, StreamSpec, Subscription};
pub use error::{Error, Result};
pub use memory::MemoryBroker;
pub use message::{AckToken, InboundMessage, StreamMessage};

#[cfg(feature = "server")]
pub use gateway::{router, Gateway, GatewayBuilder, SubjectRoutes};
#[cfg(feature = "server")]
pub use handler::GatewayState;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use bytes::Bytes;
pub use tokio_util::sync::CancellationToken;
