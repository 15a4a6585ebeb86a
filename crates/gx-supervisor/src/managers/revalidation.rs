use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use gx_core::ValidationStatus;
use gx_core::bus::GatewayEvent;
use gx_td::KeyValidator;
use tracing::{debug, info, warn};

use crate::manager::{Manager, RunContext};

/// Retries validation for active credentials still `unvalidated`, typically
/// after a rate limit or outage during `add_credential`.
pub struct RevalidationManager {
    validator: Arc<KeyValidator>,
    interval: Duration,
}

impl RevalidationManager {
    pub fn new(validator: Arc<KeyValidator>, interval: Duration) -> Self {
        Self { validator, interval }
    }
}

#[async_trait]
impl Manager for RevalidationManager {
    fn name(&self) -> &str {
        "revalidation"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, ctx: &RunContext) -> Result<()> {
        let pending = self.validator.store().pending_validation();
        if pending.is_empty() {
            return Ok(());
        }
        info!("[revalidation] {} credential(s) pending", pending.len());

        for credential in pending {
            ctx.checkpoint()?;
            let key = credential.key;
            let result = match self.validator.validate(&key).await {
                Ok(result) => result,
                // Removed since the listing.
                Err(e) => {
                    warn!("[revalidation] {key}: {e}");
                    continue;
                }
            };
            if result.status() == ValidationStatus::Unvalidated {
                debug!("[revalidation] {key} still pending: {result}");
                continue;
            }
            ctx.publish(GatewayEvent::CredentialValidated { key, status: result.status(), reason: result.reason() });
        }
        Ok(())
    }
}
