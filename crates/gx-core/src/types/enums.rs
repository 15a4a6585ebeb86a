//! Enumerations shared by every gateway crate.
//!
//! All enums serialize in the snake/lowercase form used by the JSON config and
//! by the rows handed to the external credential store.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GxError;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Which provider environment a credential targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Sandbox => write!(f, "sandbox"),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation status
// ---------------------------------------------------------------------------

/// Persisted validation state of a credential.
///
/// Only the Key Validator moves a credential to [`Valid`](Self::Valid), and
/// only after a successful authenticated round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Unvalidated,
    Valid,
    Invalid,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unvalidated => write!(f, "unvalidated"),
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signing conventions
// ---------------------------------------------------------------------------

/// Request-authentication convention a provider requires.
///
/// Each variant maps to exactly one signing scheme implementation in `gx-td`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningConvention {
    /// Binance-style: HMAC over the full query string, signature appended as
    /// a query parameter.
    BinanceHmac,
    /// Bybit v5: HMAC over `timestamp + apiKey + recvWindow + query|body`.
    BybitV5,
    /// MEXC contract API: HMAC over `apiKey + timestamp + query|body`.
    MexcContract,
}

impl SigningConvention {
    /// All known conventions, in declaration order.
    pub const ALL: [SigningConvention; 3] = [Self::BinanceHmac, Self::BybitV5, Self::MexcContract];

    /// Config-file label.
    pub fn label(self) -> &'static str {
        match self {
            Self::BinanceHmac => "binance_hmac",
            Self::BybitV5 => "bybit_v5",
            Self::MexcContract => "mexc_contract",
        }
    }
}

impl std::fmt::Display for SigningConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SigningConvention {
    type Err = GxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| GxError::Config(format!("unknown signing convention: {s}")))
    }
}

// ---------------------------------------------------------------------------
// HTTP method
// ---------------------------------------------------------------------------

/// HTTP verbs used by provider endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether request parameters travel in the query string rather than a
    /// JSON body.
    pub fn uses_query(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
