//! NATS backend for the message gateway
//!
//! # Example
//!
//! ```rust,ignore
//! use msg_gateway::{Gateway, StreamSpec, SubjectRoutes};
//! use msg_gateway_nats::NatsBroker;
//!
//! let broker = NatsBroker::connect(&["nats://localhost:4222".into()]).await?;
//!
//! Gateway::builder()
//!     .broker(broker)
//!     .stream(StreamSpec::new("orders", ["orders.*"]))
//!     .routes(SubjectRoutes::new("orders.created", "events", "billing.quote"))
//!     .build()?
//!     .run()
//!     .await
//! ```

mod broker;

pub use broker::NatsBroker;
