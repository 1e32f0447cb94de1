//! Error types for the message gateway

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a broker
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection was closed; no further operations are possible
    #[error("Connection closed")]
    ConnectionClosed,

    /// Durable publish to a subject no declared stream accepts
    #[error("No stream accepts subject '{0}'")]
    Routing(String),

    /// Request/response exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Stream declared twice with incompatible settings
    #[error("Stream '{0}' already exists with a different configuration")]
    ConfigConflict(String),

    /// Malformed payload
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Invalid subject or subject pattern
    #[error("Invalid subject: {0}")]
    Subject(String),

    /// Backend-specific errors
    #[error("Broker error: {0}")]
    Broker(#[from] anyhow::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
