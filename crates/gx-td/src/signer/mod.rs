//! Request signing.
//!
//! Every provider convention reduces to the same three steps:
//!
//! 1. build a canonical parameter string (keys sorted, `k=v`, `&`-joined,
//!    URL-encoded) and, for body-carrying methods, a compact JSON body;
//! 2. concatenate the convention's fields into the payload to sign;
//! 3. HMAC-SHA256 the payload with the credential secret, hex-encoded.
//!
//! Steps 2 and the placement of the result (headers vs. query parameter)
//! differ per convention and live behind [`SigningScheme`]. The [`Signer`]
//! is a registry of schemes keyed by [`SigningConvention`].
//!
//! Signing is pure: [`Signer::sign_at`] takes the timestamp explicitly and
//! performs no I/O, so golden vectors can be asserted byte-for-byte.

pub mod binance;
pub mod bybit;
pub mod mexc;

use std::collections::BTreeMap;

use ahash::AHashMap;
use gx_core::time_util;
use gx_core::{Credential, HttpMethod, SigningConvention};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Request parameters. A `BTreeMap` keeps keys sorted, which every
/// convention's canonical form requires.
pub type Params = BTreeMap<String, String>;

/// Receive window used when neither the caller nor the descriptor sets one.
pub const DEFAULT_RECV_WINDOW: u64 = 5000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a request could not be signed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("credential secret is empty")]
    EmptySecret,

    #[error("no signing scheme registered for convention {0}")]
    UnknownConvention(SigningConvention),

    #[error("invalid HMAC key: {0}")]
    InvalidKey(String),
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// What to sign.
#[derive(Debug, Clone, Copy)]
pub struct SignInput<'a> {
    pub method: HttpMethod,
    pub path: &'a str,
    pub query: &'a Params,
    pub body: &'a Params,
    /// Overrides the signer's default receive window.
    pub recv_window: Option<u64>,
}

/// Authentication material for exactly one outbound call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub timestamp: u64,
    pub recv_window: u64,
    /// Canonical query covered by the signature (without the signature).
    pub canonical_query: String,
    /// The exact string that was HMAC'd.
    pub payload: String,
    /// Lowercase hex HMAC-SHA256.
    pub signature: String,
    /// Headers to attach to the request.
    pub headers: Vec<(String, String)>,
    /// Query string to send (may include the signature).
    pub query: String,
    /// JSON body to send, if any.
    pub body: Option<String>,
}

impl SigningContext {
    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// One provider's signing convention.
pub trait SigningScheme: Send + Sync {
    fn convention(&self) -> SigningConvention;

    /// Produce the signing context. The secret is known to be non-empty.
    fn sign(
        &self,
        credential: &Credential,
        input: &SignInput<'_>,
        timestamp: u64,
        recv_window: u64,
    ) -> Result<SigningContext, SignError>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Result<String, SignError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SignError::InvalidKey(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Keys sorted (by `BTreeMap` order), URL-encoded, `=`-joined, `&`-separated.
pub fn canonical_query(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compact JSON object with sorted keys, or `None` for an empty body.
pub fn body_json(params: &Params) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    serde_json::to_string(params).ok()
}

/// The parameter string a header-signing convention appends to its payload:
/// the canonical query for query-carrying methods, the JSON body otherwise.
pub(crate) fn param_string(input: &SignInput<'_>) -> (String, Option<String>) {
    let canonical = canonical_query(input.query);
    if input.method.uses_query() {
        (canonical, None)
    } else {
        let body = body_json(input.body);
        (body.clone().unwrap_or_default(), body)
    }
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Registry of signing schemes.
pub struct Signer {
    schemes: AHashMap<SigningConvention, Box<dyn SigningScheme>>,
    default_recv_window: u64,
}

impl Signer {
    /// A signer with no schemes registered.
    pub fn empty() -> Self {
        Self { schemes: AHashMap::new(), default_recv_window: DEFAULT_RECV_WINDOW }
    }

    /// A signer with every built-in scheme registered.
    pub fn with_builtin() -> Self {
        let mut signer = Self::empty();
        signer.register(Box::new(binance::BinanceHmac));
        signer.register(Box::new(bybit::BybitV5));
        signer.register(Box::new(mexc::MexcContract));
        signer
    }

    pub fn with_default_recv_window(mut self, recv_window: u64) -> Self {
        self.default_recv_window = recv_window;
        self
    }

    /// Register (or replace) the scheme for its convention.
    pub fn register(&mut self, scheme: Box<dyn SigningScheme>) {
        self.schemes.insert(scheme.convention(), scheme);
    }

    pub fn supports(&self, convention: SigningConvention) -> bool {
        self.schemes.contains_key(&convention)
    }

    /// Sign at the current strictly increasing millisecond timestamp.
    pub fn sign(
        &self,
        credential: &Credential,
        convention: SigningConvention,
        input: &SignInput<'_>,
    ) -> Result<SigningContext, SignError> {
        self.sign_at(credential, convention, input, time_util::monotonic_ms())
    }

    /// Sign at an explicit timestamp. Pure.
    pub fn sign_at(
        &self,
        credential: &Credential,
        convention: SigningConvention,
        input: &SignInput<'_>,
        timestamp: u64,
    ) -> Result<SigningContext, SignError> {
        if credential.api_secret.is_empty() {
            return Err(SignError::EmptySecret);
        }
        let scheme = self.schemes.get(&convention).ok_or(SignError::UnknownConvention(convention))?;
        let recv_window = input.recv_window.unwrap_or(self.default_recv_window);
        scheme.sign(credential, input, timestamp, recv_window)
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::with_builtin()
    }
}
