//! Key Validator.
//!
//! Two steps, in order:
//!
//! 1. static checks against the provider's [`KeyFormat`]: key length, secret
//!    length, key charset, secret charset. A credential failing any of them
//!    never reaches the network;
//! 2. one authenticated `Balance` call. `Success` is `Valid`; `AuthError`,
//!    `IpRestricted` and `MalformedResponse` are `Invalid`; `RateLimited` and
//!    `NetworkError` leave the credential `Unvalidated` for a later retry.
//!
//! [`KeyValidator::validate`] writes the verdict back to the store under the
//! per-credential validation lock with a compare-and-swap on the row version.
//! [`KeyValidator::record_rejection`] does the same for an auth or IP
//! rejection another caller already received.

use std::sync::Arc;

use chrono::Utc;
use gx_core::error::GxError;
use gx_core::store::{CasOutcome, CredentialStore};
use gx_core::{Credential, CredentialKey, KeyFormat, ValidationStatus, mask};
use tracing::{debug, info, warn};

use crate::client::{Operation, ProviderClients};
use crate::outcome::OutcomeEnvelope;
use crate::signer::Params;

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Why a credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    KeyLength,
    SecretLength,
    KeyCharset,
    SecretCharset,
    Auth { code: i64, message: String },
    IpRestricted,
    MalformedResponse(String),
    UnknownProvider(String),
    Inactive,
}

impl InvalidReason {
    /// Failed before any network call.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::KeyLength | Self::SecretLength | Self::KeyCharset | Self::SecretCharset)
    }

    /// Extra context not part of the short reason.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse(d) | Self::UnknownProvider(d) => Some(d),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyLength => f.write_str("key length"),
            Self::SecretLength => f.write_str("secret length"),
            Self::KeyCharset => f.write_str("key charset"),
            Self::SecretCharset => f.write_str("secret charset"),
            Self::Auth { code, message } => write!(f, "auth error {code}: {message}"),
            Self::IpRestricted => f.write_str("ip restricted"),
            Self::MalformedResponse(_) => f.write_str("malformed response"),
            Self::UnknownProvider(_) => f.write_str("unknown provider"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

/// Verdict of one validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(InvalidReason),
    /// No verdict yet (rate limited, network trouble, concurrent change).
    Unvalidated(String),
}

impl ValidationResult {
    pub fn status(&self) -> ValidationStatus {
        match self {
            Self::Valid => ValidationStatus::Valid,
            Self::Invalid(_) => ValidationStatus::Invalid,
            Self::Unvalidated(_) => ValidationStatus::Unvalidated,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Short reason string for events, `None` when valid.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Valid => None,
            Self::Invalid(r) => Some(r.to_string()),
            Self::Unvalidated(why) => Some(why.clone()),
        }
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Invalid(r) => write!(f, "invalid({r})"),
            Self::Unvalidated(why) => write!(f, "unvalidated({why})"),
        }
    }
}

/// Static length and charset checks.
pub fn check_format(format: &KeyFormat, api_key: &str, api_secret: &str) -> Result<(), InvalidReason> {
    if !format.key_len().contains(&api_key.chars().count()) {
        return Err(InvalidReason::KeyLength);
    }
    if !format.secret_len().contains(&api_secret.chars().count()) {
        return Err(InvalidReason::SecretLength);
    }
    if !api_key.chars().all(|c| format.charset.allows(c)) {
        return Err(InvalidReason::KeyCharset);
    }
    if !api_secret.chars().all(|c| format.charset.allows(c)) {
        return Err(InvalidReason::SecretCharset);
    }
    Ok(())
}

fn verdict(outcome: OutcomeEnvelope) -> ValidationResult {
    match outcome {
        OutcomeEnvelope::Success(_) => ValidationResult::Valid,
        OutcomeEnvelope::AuthError { code, message } => ValidationResult::Invalid(InvalidReason::Auth { code, message }),
        OutcomeEnvelope::IpRestricted { .. } => ValidationResult::Invalid(InvalidReason::IpRestricted),
        OutcomeEnvelope::MalformedResponse(d) => ValidationResult::Invalid(InvalidReason::MalformedResponse(d)),
        transient @ (OutcomeEnvelope::RateLimited { .. } | OutcomeEnvelope::NetworkError(_)) => {
            ValidationResult::Unvalidated(transient.detail())
        }
    }
}

// ---------------------------------------------------------------------------
// KeyValidator
// ---------------------------------------------------------------------------

pub struct KeyValidator {
    store: Arc<CredentialStore>,
    clients: Arc<ProviderClients>,
}

impl KeyValidator {
    pub fn new(store: Arc<CredentialStore>, clients: Arc<ProviderClients>) -> Self {
        Self { store, clients }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Static then network validation. Does not touch the store.
    pub async fn check(&self, credential: &Credential) -> ValidationResult {
        let provider = &credential.key.provider;
        let Some(client) = self.clients.get(provider) else {
            return ValidationResult::Invalid(InvalidReason::UnknownProvider(provider.clone()));
        };
        let descriptor = client.descriptor();
        if !descriptor.authenticated {
            return ValidationResult::Invalid(InvalidReason::UnknownProvider(format!(
                "provider '{provider}' does not take credentials"
            )));
        }

        if let Some(format) = descriptor.effective_key_format() {
            if let Err(reason) = check_format(&format, &credential.api_key, &credential.api_secret) {
                debug!("[validator] {} key {} rejected: {reason}", credential.key, mask(&credential.api_key));
                return ValidationResult::Invalid(reason);
            }
        }

        verdict(client.call(credential, Operation::Balance, &Params::new()).await)
    }

    /// Validate a stored credential and persist the verdict.
    ///
    /// `Unvalidated` results are not written, so an earlier verdict survives a
    /// transient outage. An inactive row is reported `Invalid(Inactive)` and
    /// left untouched.
    pub async fn validate(&self, key: &CredentialKey) -> Result<ValidationResult, GxError> {
        let not_found = || GxError::CredentialNotFound(key.to_string());
        let _guard = self.store.lock_for_validation(key).await.ok_or_else(not_found)?;
        let snapshot = self.store.get(key).ok_or_else(not_found)?;
        if !snapshot.active {
            return Ok(ValidationResult::Invalid(InvalidReason::Inactive));
        }

        let result = self.check(&snapshot).await;
        if let ValidationResult::Unvalidated(why) = &result {
            info!("[validator] {key} still unvalidated: {why}");
            return Ok(result);
        }

        match self.store.compare_and_set_status(key, snapshot.version, result.status(), Utc::now()) {
            CasOutcome::Applied(row) => {
                info!("[validator] {key} -> {result} (v{})", row.version);
                Ok(result)
            }
            CasOutcome::Stale { current_version } => {
                warn!("[validator] {key} changed during validation (v{} -> v{current_version}), verdict dropped", snapshot.version);
                Ok(ValidationResult::Unvalidated("credential changed during validation".into()))
            }
            CasOutcome::Missing => Err(not_found()),
        }
    }

    /// Persist a definitive rejection seen on a regular authenticated call,
    /// without another round-trip.
    ///
    /// Only `AuthError` and `IpRestricted` qualify; other outcomes return
    /// `Ok(None)` and leave the row alone. `credential` is the snapshot the
    /// call was made with: if the row changed since, nothing is written.
    pub async fn record_rejection(
        &self,
        credential: &Credential,
        outcome: &OutcomeEnvelope,
    ) -> Result<Option<ValidationResult>, GxError> {
        let reason = match outcome {
            OutcomeEnvelope::AuthError { code, message } => InvalidReason::Auth { code: *code, message: message.clone() },
            OutcomeEnvelope::IpRestricted { .. } => InvalidReason::IpRestricted,
            _ => return Ok(None),
        };
        let key = &credential.key;
        let not_found = || GxError::CredentialNotFound(key.to_string());
        let _guard = self.store.lock_for_validation(key).await.ok_or_else(not_found)?;

        let result = ValidationResult::Invalid(reason);
        match self.store.compare_and_set_status(key, credential.version, result.status(), Utc::now()) {
            CasOutcome::Applied(row) => {
                info!("[validator] {key} -> {result} from a rejected call (v{})", row.version);
                Ok(Some(result))
            }
            CasOutcome::Stale { current_version } => {
                warn!("[validator] {key} changed since the rejected call (v{} -> v{current_version}), not marked", credential.version);
                Ok(Some(ValidationResult::Unvalidated("credential changed during validation".into())))
            }
            CasOutcome::Missing => Err(not_found()),
        }
    }
}
