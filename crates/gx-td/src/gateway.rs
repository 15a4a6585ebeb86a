//! Credential ingestion surface.
//!
//! `add_credential` only stores what the validator did not reject:
//!
//! | Verdict        | Stored as     | Network calls |
//! |----------------|---------------|---------------|
//! | static failure | not stored    | 0             |
//! | `Invalid`      | not stored    | 1             |
//! | `Valid`        | `valid`       | 1             |
//! | `Unvalidated`  | `unvalidated` | 1             |

use std::sync::Arc;

use chrono::Utc;
use gx_core::bus::{EventBus, GatewayEvent};
use gx_core::error::Result;
use gx_core::store::CredentialStore;
use gx_core::{Credential, CredentialKey, CredentialSubmission, ValidationStatus, mask};
use tracing::{info, warn};

use crate::validator::{KeyValidator, ValidationResult};

pub struct CredentialGateway {
    store: Arc<CredentialStore>,
    validator: Arc<KeyValidator>,
    bus: Option<EventBus>,
}

impl CredentialGateway {
    pub fn new(validator: Arc<KeyValidator>) -> Self {
        Self { store: Arc::clone(validator.store()), validator, bus: None }
    }

    /// Announce every verdict as [`GatewayEvent::CredentialValidated`].
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn validator(&self) -> &Arc<KeyValidator> {
        &self.validator
    }

    fn announce(&self, key: &CredentialKey, result: &ValidationResult) {
        if let Some(bus) = &self.bus {
            bus.publish(GatewayEvent::CredentialValidated {
                key: key.clone(),
                status: result.status(),
                reason: result.reason(),
            });
        }
    }

    /// Validate a submission and store it unless it was rejected.
    pub async fn add_credential(&self, submission: CredentialSubmission) -> ValidationResult {
        let mut credential = submission.into_credential();
        let key = credential.key.clone();
        let result = self.validator.check(&credential).await;

        match &result {
            ValidationResult::Invalid(reason) => {
                warn!("[gateway] rejected {key} key {}: {reason}", mask(&credential.api_key));
            }
            ValidationResult::Valid => {
                credential.validation_status = ValidationStatus::Valid;
                credential.last_validated_at = Some(Utc::now());
                self.store.upsert(credential);
                info!("[gateway] accepted {key}");
            }
            ValidationResult::Unvalidated(why) => {
                self.store.upsert(credential);
                info!("[gateway] stored {key} pending validation: {why}");
            }
        }
        self.announce(&key, &result);
        result
    }

    /// Re-run validation for a stored credential.
    pub async fn revalidate(&self, key: &CredentialKey) -> Result<ValidationResult> {
        let result = self.validator.validate(key).await?;
        self.announce(key, &result);
        Ok(result)
    }

    pub fn deactivate(&self, key: &CredentialKey) -> Result<Credential> {
        self.store.set_active(key, false)
    }

    pub fn remove(&self, key: &CredentialKey) -> Option<Credential> {
        self.store.remove(key)
    }

    pub fn list(&self) -> Vec<Credential> {
        self.store.list()
    }
}
