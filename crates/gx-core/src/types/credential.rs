//! Tenant credentials and their row key.
//!
//! A [`Credential`] belongs to exactly one tenant and one provider. The
//! [`CredentialStore`](crate::store::CredentialStore) owns every instance;
//! other components only ever see clones or borrowed snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Environment, ValidationStatus};

// ---------------------------------------------------------------------------
// CredentialKey
// ---------------------------------------------------------------------------

/// Row key of a credential: `(tenant_id, provider, environment)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    pub tenant_id: String,
    pub provider: String,
    pub environment: Environment,
}

impl CredentialKey {
    pub fn new(tenant_id: impl Into<String>, provider: impl Into<String>, environment: Environment) -> Self {
        Self { tenant_id: tenant_id.into(), provider: provider.into(), environment }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.provider, self.environment)
    }
}

// ---------------------------------------------------------------------------
// CredentialSubmission (ingestion input)
// ---------------------------------------------------------------------------

/// What a provisioning collaborator submits to `add_credential`.
#[derive(Clone, Deserialize)]
pub struct CredentialSubmission {
    pub tenant_id: String,
    pub provider: String,
    #[serde(default)]
    pub environment: Environment,
    pub api_key: String,
    pub api_secret: String,
}

impl CredentialSubmission {
    /// Row key this submission would occupy. Provider names are matched
    /// case-insensitively, like descriptor names.
    pub fn key(&self) -> CredentialKey {
        CredentialKey::new(&self.tenant_id, self.provider.trim().to_lowercase(), self.environment)
    }

    /// Build a fresh, active, unvalidated credential from the submission.
    pub fn into_credential(self) -> Credential {
        Credential {
            key: self.key(),
            api_key: self.api_key,
            api_secret: self.api_secret,
            active: true,
            validation_status: ValidationStatus::Unvalidated,
            last_validated_at: None,
            version: 0,
        }
    }
}

impl std::fmt::Debug for CredentialSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSubmission")
            .field("key", &self.key().to_string())
            .field("api_key", &mask(&self.api_key))
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A per-tenant, per-provider API key/secret pair plus validation metadata.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub key: CredentialKey,
    pub api_key: String,
    pub api_secret: String,
    pub active: bool,
    pub validation_status: ValidationStatus,
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Store-managed revision, bumped on every replace or status write.
    #[serde(default)]
    pub version: u64,
}

impl Credential {
    /// Whether the credential may be used for authenticated polling.
    pub fn is_usable(&self) -> bool {
        self.active && self.validation_status == ValidationStatus::Valid
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key", &self.key.to_string())
            .field("api_key", &mask(&self.api_key))
            .field("active", &self.active)
            .field("validation_status", &self.validation_status)
            .field("last_validated_at", &self.last_validated_at)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Keep the first four characters of a key for log correlation.
pub fn mask(key: &str) -> String {
    let head: String = key.chars().take(4).collect();
    format!("{head}***")
}
