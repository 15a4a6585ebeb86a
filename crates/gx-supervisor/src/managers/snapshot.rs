use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use gx_core::bus::GatewayEvent;
use gx_core::store::CredentialStore;
use gx_td::{KeyValidator, Operation, OutcomeEnvelope, Params, ProviderClients, RetryPolicy, call_with_retry};
use tracing::{debug, info, warn};

use crate::manager::{Manager, RunContext};

/// Fetches the balance of every active, valid credential.
///
/// Transient failures go through the retry policy. An auth or IP rejection is
/// definitive: when a validator is attached the rejection is recorded as an
/// `invalid` verdict without another call, which takes the credential out of
/// the polling set.
pub struct AccountSnapshotManager {
    store: Arc<CredentialStore>,
    clients: Arc<ProviderClients>,
    policy: RetryPolicy,
    validator: Option<Arc<KeyValidator>>,
    interval: Duration,
}

impl AccountSnapshotManager {
    pub fn new(store: Arc<CredentialStore>, clients: Arc<ProviderClients>, interval: Duration) -> Self {
        Self { store, clients, policy: RetryPolicy::default(), validator: None, interval }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_validator(mut self, validator: Arc<KeyValidator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

#[async_trait]
impl Manager for AccountSnapshotManager {
    fn name(&self) -> &str {
        "account-snapshot"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, ctx: &RunContext) -> Result<()> {
        let credentials = self.store.active_valid();
        if credentials.is_empty() {
            debug!("[snapshot] no active credentials");
            return Ok(());
        }

        let mut failed = 0usize;
        for credential in &credentials {
            ctx.checkpoint()?;
            let key = credential.key.clone();
            let Some(client) = self.clients.get(&key.provider) else {
                warn!("[snapshot] {key}: no client for provider '{}'", key.provider);
                failed += 1;
                continue;
            };

            let outcome =
                call_with_retry(&client, credential, Operation::Balance, &Params::new(), &self.policy, ctx.cancellation())
                    .await;
            let outcome = match outcome {
                OutcomeEnvelope::Success(payload) => {
                    ctx.publish(GatewayEvent::AccountSnapshot { key, payload, fetched_at: Utc::now() });
                    continue;
                }
                other => other,
            };

            failed += 1;
            warn!("[snapshot] {key} balance failed: {}", outcome.detail());
            ctx.publish(GatewayEvent::ProviderCallFailed {
                key: key.clone(),
                outcome: outcome.label().to_string(),
                detail: outcome.detail(),
            });

            if let Some(validator) = &self.validator {
                match validator.record_rejection(credential, &outcome).await {
                    Ok(Some(result)) => {
                        info!("[snapshot] {key} marked {result}");
                        ctx.publish(GatewayEvent::CredentialValidated {
                            key,
                            status: result.status(),
                            reason: result.reason(),
                        });
                    }
                    Ok(None) => {}
                    Err(e) => debug!("[snapshot] {key} rejection not recorded: {e}"),
                }
            }
        }

        if failed > 0 {
            bail!("{failed} of {} snapshot(s) failed", credentials.len());
        }
        Ok(())
    }
}
