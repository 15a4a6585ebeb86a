//! Static provider descriptors.
//!
//! A [`ProviderDescriptor`] is built once from config at startup and shared
//! (behind `Arc`) by every credential of that provider. It is never mutated
//! afterwards.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::enums::{HttpMethod, SigningConvention};

// ---------------------------------------------------------------------------
// Key format constraints
// ---------------------------------------------------------------------------

/// Characters permitted in an API key or secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    /// `[A-Za-z0-9]`
    #[default]
    Alphanumeric,
    /// `[A-Za-z0-9_-]`
    AlphanumericDashUnderscore,
    /// Any printable ASCII except whitespace.
    PrintableAscii,
}

impl Charset {
    pub fn allows(self, c: char) -> bool {
        match self {
            Self::Alphanumeric => c.is_ascii_alphanumeric(),
            Self::AlphanumericDashUnderscore => c.is_ascii_alphanumeric() || c == '-' || c == '_',
            Self::PrintableAscii => c.is_ascii_graphic(),
        }
    }
}

/// Length and charset rules a key/secret pair must satisfy before any network
/// call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFormat {
    pub key_min: usize,
    pub key_max: usize,
    pub secret_min: usize,
    pub secret_max: usize,
    #[serde(default)]
    pub charset: Charset,
}

impl KeyFormat {
    pub fn key_len(&self) -> RangeInclusive<usize> {
        self.key_min..=self.key_max
    }

    pub fn secret_len(&self) -> RangeInclusive<usize> {
        self.secret_min..=self.secret_max
    }

    /// Default rules for the given signing convention.
    pub fn default_for(convention: SigningConvention) -> Self {
        match convention {
            SigningConvention::BinanceHmac => Self {
                key_min: 60,
                key_max: 70,
                secret_min: 60,
                secret_max: 70,
                charset: Charset::Alphanumeric,
            },
            SigningConvention::BybitV5 => Self {
                key_min: 18,
                key_max: 64,
                secret_min: 18,
                secret_max: 64,
                charset: Charset::Alphanumeric,
            },
            SigningConvention::MexcContract => Self {
                key_min: 18,
                key_max: 64,
                secret_min: 18,
                secret_max: 64,
                charset: Charset::AlphanumericDashUnderscore,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// A concrete `(method, path)` pair for one provider operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
}

impl Endpoint {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, path: path.into() }
    }
}

// ---------------------------------------------------------------------------
// ProviderDescriptor
// ---------------------------------------------------------------------------

/// Immutable description of one external provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider name (e.g. `"binance"`); credentials reference it.
    pub name: String,
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// `None` for providers that need no authentication.
    pub signing_convention: Option<SigningConvention>,
    /// Advisory requests-per-minute budget, logged at startup.
    pub rate_limit_hint: Option<u32>,
    pub authenticated: bool,
    pub key_format: Option<KeyFormat>,
    /// Per-operation overrides keyed by operation label (`"balance"`, ...).
    #[serde(default)]
    pub endpoints: HashMap<String, Endpoint>,
    /// Receive window in milliseconds.
    pub recv_window_ms: u64,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl ProviderDescriptor {
    /// Effective key format: configured override, else the convention default.
    pub fn effective_key_format(&self) -> Option<KeyFormat> {
        self.key_format
            .clone()
            .or_else(|| self.signing_convention.map(KeyFormat::default_for))
    }

    /// Look up a configured endpoint override.
    pub fn endpoint_override(&self, operation: &str) -> Option<&Endpoint> {
        self.endpoints.get(operation)
    }
}
