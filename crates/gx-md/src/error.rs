//! Market-data provider failures.
//!
//! None of these reach a metric consumer: the aggregator treats every
//! variant as "advance to the next provider".

use gx_core::error::TransportError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MdError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP 200 carrying a provider error code.
    #[error("provider code {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("parse: {0}")]
    Parse(String),

    #[error("no usable assets in response")]
    NoAssets,

    #[error("attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("unknown market source kind: {0}")]
    UnknownSource(String),
}
