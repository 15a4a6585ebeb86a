//! Response classification.
//!
//! Every provider call ends in exactly one [`OutcomeEnvelope`] variant.
//! Providers report errors both through HTTP status and through a
//! payload-level return code (often on HTTP 200), so [`classify`] looks at
//! both, in this order:
//!
//! 1. HTTP 429 / 418: `RateLimited`, honoring `Retry-After` (seconds) or the
//!    Bybit reset-timestamp header.
//! 2. HTTP 5xx: `NetworkError`.
//! 3. Body is not JSON: 403 is `IpRestricted`, 401 is `AuthError`, anything
//!    else is `MalformedResponse`.
//! 4. The convention's payload code table.
//! 5. Remaining 403 / 401 / non-2xx statuses, then `Success`.

use std::time::Duration;

use gx_core::SigningConvention;
use gx_core::error::TransportError;
use gx_core::transport::HttpResponse;
use serde_json::Value;

use crate::signer::bybit::LIMIT_RESET_HEADER;

/// Typed result of one provider call. Callers must handle every variant.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeEnvelope {
    Success(Value),
    /// Bad signature, expired or unknown key, clock outside the window.
    AuthError { code: i64, message: String },
    RateLimited { retry_after: Option<Duration> },
    /// Credential accepted but the caller IP is not allow-listed.
    IpRestricted { message: String },
    NetworkError(String),
    MalformedResponse(String),
}

impl OutcomeEnvelope {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::AuthError { .. } => "auth_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::IpRestricted { .. } => "ip_restricted",
            Self::NetworkError(_) => "network_error",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether an immediate retry could plausibly succeed.
    /// `IpRestricted` and `AuthError` are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::NetworkError(_))
    }

    /// Human-readable detail for logs and events. Never contains secrets.
    pub fn detail(&self) -> String {
        match self {
            Self::Success(_) => "ok".into(),
            Self::AuthError { code, message } => format!("auth error {code}: {message}"),
            Self::RateLimited { retry_after: Some(d) } => format!("rate limited, retry after {} ms", d.as_millis()),
            Self::RateLimited { retry_after: None } => "rate limited".into(),
            Self::IpRestricted { message } => format!("ip restricted: {message}"),
            Self::NetworkError(msg) => format!("network error: {msg}"),
            Self::MalformedResponse(msg) => format!("malformed response: {msg}"),
        }
    }
}

impl From<TransportError> for OutcomeEnvelope {
    fn from(err: TransportError) -> Self {
        Self::NetworkError(err.to_string())
    }
}

const SNIPPET_LEN: usize = 200;

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn retry_after(resp: &HttpResponse, now_ms: u64) -> Option<Duration> {
    if let Some(secs) = resp.header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset_ms = resp.header(LIMIT_RESET_HEADER)?.trim().parse::<u64>().ok()?;
    Some(Duration::from_millis(reset_ms.saturating_sub(now_ms)))
}

/// Classify a raw response. `convention` selects the payload code table;
/// `None` (unauthenticated providers) uses HTTP status only.
pub fn classify(convention: Option<SigningConvention>, resp: &HttpResponse, now_ms: u64) -> OutcomeEnvelope {
    let status = resp.status;

    if status == 429 || status == 418 {
        return OutcomeEnvelope::RateLimited { retry_after: retry_after(resp, now_ms) };
    }
    if status >= 500 {
        return OutcomeEnvelope::NetworkError(format!("http {status}"));
    }

    let payload: Value = match serde_json::from_str(&resp.body) {
        Ok(v) => v,
        Err(_) => {
            return match status {
                403 => OutcomeEnvelope::IpRestricted { message: snippet(&resp.body) },
                401 => OutcomeEnvelope::AuthError { code: 401, message: snippet(&resp.body) },
                _ => OutcomeEnvelope::MalformedResponse(format!("non-JSON body (http {status})")),
            };
        }
    };

    let by_code = match convention {
        Some(SigningConvention::BinanceHmac) => binance_code(&payload),
        Some(SigningConvention::BybitV5) => bybit_code(&payload, resp.is_success()),
        Some(SigningConvention::MexcContract) => mexc_code(&payload),
        None => None,
    };
    if let Some(outcome) = by_code {
        return outcome;
    }

    match status {
        403 => OutcomeEnvelope::IpRestricted { message: snippet(&resp.body) },
        401 => OutcomeEnvelope::AuthError { code: 401, message: snippet(&resp.body) },
        s if !(200..300).contains(&s) => OutcomeEnvelope::MalformedResponse(format!("http {s}: {}", snippet(&resp.body))),
        _ => OutcomeEnvelope::Success(payload),
    }
}

fn message(payload: &Value, field: &str) -> String {
    payload.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Binance: errors are `{"code": <negative>, "msg": "..."}`; success bodies
/// carry no `code`.
fn binance_code(payload: &Value) -> Option<OutcomeEnvelope> {
    let code = payload.get("code")?.as_i64()?;
    let msg = message(payload, "msg");
    Some(match code {
        0 | 200 => return None,
        -1003 | -1015 => OutcomeEnvelope::RateLimited { retry_after: None },
        // -2015 also covers IP mismatches; Binance does not distinguish them.
        -1002 | -1021 | -1022 | -2014 | -2015 => OutcomeEnvelope::AuthError { code, message: msg },
        _ => OutcomeEnvelope::MalformedResponse(format!("code {code}: {msg}")),
    })
}

/// Bybit v5: every response carries `retCode`, zero on success.
fn bybit_code(payload: &Value, http_ok: bool) -> Option<OutcomeEnvelope> {
    let Some(code) = payload.get("retCode").and_then(Value::as_i64) else {
        return http_ok.then(|| OutcomeEnvelope::MalformedResponse("missing retCode".into()));
    };
    let msg = message(payload, "retMsg");
    Some(match code {
        0 => return None,
        10002 | 10003 | 10004 | 10005 | 10007 | 33004 => OutcomeEnvelope::AuthError { code, message: msg },
        10010 => OutcomeEnvelope::IpRestricted { message: msg },
        10006 | 10018 => OutcomeEnvelope::RateLimited { retry_after: None },
        _ => OutcomeEnvelope::MalformedResponse(format!("retCode {code}: {msg}")),
    })
}

/// MEXC contract: `{"success": bool, "code": int, ...}`, code zero on success.
fn mexc_code(payload: &Value) -> Option<OutcomeEnvelope> {
    let success = payload.get("success").and_then(Value::as_bool);
    let code = payload.get("code").and_then(Value::as_i64);
    let msg = message(payload, "message");
    match (success, code) {
        (Some(true), _) | (None, Some(0)) | (None, None) => None,
        (_, Some(code @ (401 | 402 | 602))) => Some(OutcomeEnvelope::AuthError { code, message: msg }),
        (_, Some(406)) => Some(OutcomeEnvelope::IpRestricted { message: msg }),
        (_, Some(510)) => Some(OutcomeEnvelope::RateLimited { retry_after: None }),
        (_, Some(code)) => Some(OutcomeEnvelope::MalformedResponse(format!("code {code}: {msg}"))),
        (Some(false), None) => Some(OutcomeEnvelope::MalformedResponse(format!("success=false: {msg}"))),
    }
}
