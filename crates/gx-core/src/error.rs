//! Typed error definitions for the gateway.
//!
//! [`GxError`] covers failures that are not provider outcomes: bad config,
//! malformed credentials, transport faults and unknown metric names. Provider
//! responses are never errors; they are classified into an outcome envelope
//! by `gx-td`. All variants implement `std::error::Error` via `thiserror`, so
//! they compose with `anyhow::Result` at the binary boundary.

use thiserror::Error;

/// Domain-specific errors for the gateway.
#[derive(Debug, Error)]
pub enum GxError {
    /// Bad provider descriptor, unknown signing convention, duplicate names.
    /// Fatal at startup, never retried.
    #[error("config error: {0}")]
    Config(String),

    /// Credential failed format/length checks; never reaches the network.
    #[error("credential error: {0}")]
    Credential(String),

    /// No credential stored under the given key.
    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    /// HTTP transport failure (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Metric name not recognized by the aggregator.
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

/// Failure of a single HTTP exchange before any response was classified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The bounded per-call timeout elapsed.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// TCP/TLS connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending or reading the body.
    #[error("{0}")]
    Other(String),
}

/// Result alias used across gateway crates.
pub type Result<T> = std::result::Result<T, GxError>;
