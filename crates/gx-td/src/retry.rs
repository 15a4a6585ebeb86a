//! Retry policy for transient provider outcomes.
//!
//! Only `RateLimited` and `NetworkError` are retried. `AuthError`,
//! `IpRestricted`, `MalformedResponse` and `Success` are returned the first
//! time they are seen. A provider `retry_after` hint replaces the computed
//! backoff; a hint longer than `max_retry_hint` ends the retries and the
//! outcome is handed back to the caller's next scheduled tick.

use std::time::Duration;

use gx_core::Credential;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{Operation, ProviderClient};
use crate::outcome::OutcomeEnvelope;
use crate::signer::Params;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Longest provider hint the policy is willing to sleep for.
    pub max_retry_hint: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            max_retry_hint: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Exponential backoff for the given 1-based attempt that just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Delay before the next attempt, or `None` if the outcome must be
    /// returned as is.
    pub fn delay_for(&self, outcome: &OutcomeEnvelope, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        match outcome {
            OutcomeEnvelope::RateLimited { retry_after: Some(hint) } => (*hint <= self.max_retry_hint).then_some(*hint),
            OutcomeEnvelope::RateLimited { retry_after: None } | OutcomeEnvelope::NetworkError(_) => Some(self.backoff(attempt)),
            _ => None,
        }
    }
}

/// Call `op` under `policy`. Cancellation ends the wait between attempts and
/// returns the last outcome seen.
pub async fn call_with_retry(
    client: &ProviderClient,
    credential: &Credential,
    op: Operation,
    params: &Params,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> OutcomeEnvelope {
    let mut attempt = 1;
    loop {
        let outcome = client.call(credential, op, params).await;
        let Some(delay) = policy.delay_for(&outcome, attempt) else {
            return outcome;
        };
        debug!(
            "[retry] {} {op} for {} attempt {attempt}/{} -> {}, retrying in {} ms",
            client.name(),
            credential.key,
            policy.max_attempts,
            outcome.label(),
            delay.as_millis()
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[retry] {} {op} for {} cancelled", client.name(), credential.key);
                return outcome;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::fixtures::descriptor;
    use crate::signer::Signer;
    use crate::signer::test_support::credential;
    use crate::testing::FakeTransport;
    use gx_core::SigningConvention;
    use gx_core::transport::HttpResponse;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            max_retry_hint: Duration::from_millis(50),
        }
    }

    fn client(fake: Arc<FakeTransport>) -> ProviderClient {
        ProviderClient::new(
            Arc::new(descriptor("bybit", SigningConvention::BybitV5, "http://fake")),
            Arc::new(Signer::with_builtin()),
            fake,
        )
        .unwrap()
    }

    fn cred() -> Credential {
        credential("bybit", "A1b2C3d4E5f6G7h8I9", "S3cr3tS3cr3tS3cr3tS3cr3tS3cr3tS3cr3t")
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let p = RetryPolicy { base_backoff: Duration::from_millis(100), max_backoff: Duration::from_millis(350), ..RetryPolicy::default() };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn only_transient_outcomes_are_retried() {
        let p = fast();
        assert!(p.delay_for(&OutcomeEnvelope::NetworkError("x".into()), 1).is_some());
        assert!(p.delay_for(&OutcomeEnvelope::RateLimited { retry_after: None }, 1).is_some());
        assert!(p.delay_for(&OutcomeEnvelope::IpRestricted { message: String::new() }, 1).is_none());
        assert!(p.delay_for(&OutcomeEnvelope::AuthError { code: 1, message: String::new() }, 1).is_none());
        assert!(p.delay_for(&OutcomeEnvelope::MalformedResponse(String::new()), 1).is_none());
        assert!(p.delay_for(&OutcomeEnvelope::NetworkError("x".into()), 3).is_none());
    }

    #[test]
    fn provider_hint_is_honored_up_to_limit() {
        let p = fast();
        let short = OutcomeEnvelope::RateLimited { retry_after: Some(Duration::from_millis(20)) };
        assert_eq!(p.delay_for(&short, 1), Some(Duration::from_millis(20)));
        let long = OutcomeEnvelope::RateLimited { retry_after: Some(Duration::from_secs(60)) };
        assert_eq!(p.delay_for(&long, 1), None);
    }

    #[tokio::test]
    async fn retries_network_error_then_succeeds() {
        let fake = Arc::new(
            FakeTransport::ok(r#"{"retCode":0,"result":{}}"#)
                .then(Ok(HttpResponse::new(502, "bad gateway")))
                .then(Ok(HttpResponse::new(429, ""))),
        );
        let c = client(fake.clone());
        let outcome = call_with_retry(&c, &cred(), Operation::Balance, &Params::new(), &fast(), &CancellationToken::new()).await;
        assert!(outcome.is_success());
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn ip_restriction_is_never_retried() {
        let fake = Arc::new(FakeTransport::ok(r#"{"retCode":10010,"retMsg":"Unmatched IP"}"#));
        let c = client(fake.clone());
        let outcome = call_with_retry(&c, &cred(), Operation::Balance, &Params::new(), &fast(), &CancellationToken::new()).await;
        assert!(matches!(outcome, OutcomeEnvelope::IpRestricted { .. }));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fake = Arc::new(FakeTransport::always(Ok(HttpResponse::new(503, ""))));
        let c = client(fake.clone());
        let outcome = call_with_retry(&c, &cred(), Operation::Balance, &Params::new(), &fast(), &CancellationToken::new()).await;
        assert!(matches!(outcome, OutcomeEnvelope::NetworkError(_)));
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let fake = Arc::new(FakeTransport::always(Ok(HttpResponse::new(503, ""))));
        let c = client(fake.clone());
        let slow = RetryPolicy { base_backoff: Duration::from_secs(30), max_backoff: Duration::from_secs(30), ..fast() };
        let token = CancellationToken::new();
        token.cancel();
        let outcome = call_with_retry(&c, &cred(), Operation::Balance, &Params::new(), &slow, &token).await;
        assert!(matches!(outcome, OutcomeEnvelope::NetworkError(_)));
        assert_eq!(fake.calls(), 1);
    }
}
