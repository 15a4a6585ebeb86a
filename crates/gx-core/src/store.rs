//! In-memory Credential Store.
//!
//! The store is the only shared mutable resource in the gateway. Each row
//! lives in its own entry with two locks:
//!
//! - a short, synchronous `RwLock` around the [`Credential`] itself, so a
//!   reader always sees a whole row, never a half-written one;
//! - an async validation lock that serializes validation attempts for the
//!   same key across the network round-trip.
//!
//! Every write assigns a fresh store-wide `version`. Validation verdicts are
//! written with [`CredentialStore::compare_and_set_status`], which refuses to
//! overwrite a row that was replaced after the verdict was computed.
//!
//! The map itself only takes its write lock for inserts and removals.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{GxError, Result};
use crate::types::{Credential, CredentialKey, ValidationStatus};

struct Entry {
    row: RwLock<Credential>,
    validation: Arc<Mutex<()>>,
}

/// Outcome of a compare-and-swap status write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The write was applied; the updated row is returned.
    Applied(Credential),
    /// The row changed since `expected_version` was read; nothing written.
    Stale { current_version: u64 },
    /// No row under that key.
    Missing,
}

/// Thread-safe credential store keyed by `(tenant, provider, environment)`.
#[derive(Default)]
pub struct CredentialStore {
    rows: RwLock<AHashMap<CredentialKey, Arc<Entry>>>,
    next_version: AtomicU64,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn entry(&self, key: &CredentialKey) -> Option<Arc<Entry>> {
        self.rows.read().get(key).cloned()
    }

    /// Insert or replace a credential. Returns the stored row (with its new
    /// version).
    pub fn upsert(&self, mut credential: Credential) -> Credential {
        credential.version = self.bump();
        let key = credential.key.clone();

        if let Some(entry) = self.entry(&key) {
            *entry.row.write() = credential.clone();
            debug!("[store] replaced {key} (v{})", credential.version);
            return credential;
        }

        let mut rows = self.rows.write();
        match rows.get(&key) {
            // Raced with another insert of the same key.
            Some(entry) => *entry.row.write() = credential.clone(),
            None => {
                let entry = Entry { row: RwLock::new(credential.clone()), validation: Arc::new(Mutex::new(())) };
                rows.insert(key.clone(), Arc::new(entry));
            }
        }
        info!("[store] stored {key} status={} (v{})", credential.validation_status, credential.version);
        credential
    }

    /// Bulk-load rows handed over by an external store at startup.
    pub fn load_rows(&self, rows: impl IntoIterator<Item = Credential>) -> usize {
        rows.into_iter().map(|row| self.upsert(row)).count()
    }

    /// Snapshot of one row.
    pub fn get(&self, key: &CredentialKey) -> Option<Credential> {
        self.entry(key).map(|e| e.row.read().clone())
    }

    pub fn contains(&self, key: &CredentialKey) -> bool {
        self.rows.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a row, returning its last state.
    pub fn remove(&self, key: &CredentialKey) -> Option<Credential> {
        let removed = self.rows.write().remove(key);
        removed.map(|e| {
            info!("[store] removed {key}");
            e.row.read().clone()
        })
    }

    /// Toggle the `active` flag.
    pub fn set_active(&self, key: &CredentialKey, active: bool) -> Result<Credential> {
        let entry = self.entry(key).ok_or_else(|| GxError::CredentialNotFound(key.to_string()))?;
        let mut row = entry.row.write();
        row.active = active;
        row.version = self.bump();
        info!("[store] {key} active={active}");
        Ok(row.clone())
    }

    /// Write a validation verdict if and only if the row is still at
    /// `expected_version`. Status and timestamp change together.
    pub fn compare_and_set_status(
        &self,
        key: &CredentialKey,
        expected_version: u64,
        status: ValidationStatus,
        validated_at: DateTime<Utc>,
    ) -> CasOutcome {
        let Some(entry) = self.entry(key) else {
            return CasOutcome::Missing;
        };
        let mut row = entry.row.write();
        if row.version != expected_version {
            return CasOutcome::Stale { current_version: row.version };
        }
        row.validation_status = status;
        row.last_validated_at = Some(validated_at);
        row.version = self.bump();
        CasOutcome::Applied(row.clone())
    }

    /// Acquire the per-credential validation lock. Held across the network
    /// round-trip so concurrent validations of one key run one at a time.
    pub async fn lock_for_validation(&self, key: &CredentialKey) -> Option<OwnedMutexGuard<()>> {
        let lock = self.entry(key).map(|e| Arc::clone(&e.validation))?;
        Some(lock.lock_owned().await)
    }

    /// Snapshot of every row.
    pub fn list(&self) -> Vec<Credential> {
        self.rows.read().values().map(|e| e.row.read().clone()).collect()
    }

    /// Rows that may be used for authenticated polling.
    pub fn active_valid(&self) -> Vec<Credential> {
        self.filter(Credential::is_usable)
    }

    /// Active rows still awaiting a verdict (e.g. after a rate-limited check).
    pub fn pending_validation(&self) -> Vec<Credential> {
        self.filter(|c| c.active && c.validation_status == ValidationStatus::Unvalidated)
    }

    /// Rows in a stable order, for handing to an external store.
    pub fn export_rows(&self) -> Vec<Credential> {
        let mut rows = self.list();
        rows.sort_by(|a, b| {
            (&a.key.tenant_id, &a.key.provider, a.key.environment.to_string()).cmp(&(
                &b.key.tenant_id,
                &b.key.provider,
                b.key.environment.to_string(),
            ))
        });
        rows
    }

    fn filter(&self, pred: impl Fn(&Credential) -> bool) -> Vec<Credential> {
        self.rows
            .read()
            .values()
            .map(|e| e.row.read().clone())
            .filter(|c| pred(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Environment;

    fn cred(tenant: &str) -> Credential {
        Credential {
            key: CredentialKey::new(tenant, "bybit", Environment::Production),
            api_key: "ABCDEFGHIJKLMNOPQRST".into(),
            api_secret: "SECRETSECRETSECRETSE".into(),
            active: true,
            validation_status: ValidationStatus::Unvalidated,
            last_validated_at: None,
            version: 0,
        }
    }

    #[test]
    fn upsert_assigns_increasing_versions() {
        let store = CredentialStore::new();
        let a = store.upsert(cred("t1"));
        let b = store.upsert(cred("t1"));
        assert!(b.version > a.version);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&a.key).unwrap().version, b.version);
    }

    #[test]
    fn cas_applies_on_matching_version() {
        let store = CredentialStore::new();
        let row = store.upsert(cred("t1"));
        let now = Utc::now();
        match store.compare_and_set_status(&row.key, row.version, ValidationStatus::Valid, now) {
            CasOutcome::Applied(updated) => {
                assert_eq!(updated.validation_status, ValidationStatus::Valid);
                assert_eq!(updated.last_validated_at, Some(now));
                assert!(updated.version > row.version);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn cas_rejects_stale_version() {
        let store = CredentialStore::new();
        let first = store.upsert(cred("t1"));
        // Replaced after the verdict was computed.
        let second = store.upsert(cred("t1"));

        let outcome = store.compare_and_set_status(&first.key, first.version, ValidationStatus::Valid, Utc::now());
        assert_eq!(outcome, CasOutcome::Stale { current_version: second.version });
        assert_eq!(store.get(&first.key).unwrap().validation_status, ValidationStatus::Unvalidated);
    }

    #[test]
    fn cas_on_missing_row() {
        let store = CredentialStore::new();
        let key = CredentialKey::new("nobody", "bybit", Environment::Sandbox);
        assert_eq!(store.compare_and_set_status(&key, 1, ValidationStatus::Valid, Utc::now()), CasOutcome::Missing);
    }

    #[test]
    fn filters_by_usability() {
        let store = CredentialStore::new();
        let a = store.upsert(cred("a"));
        let b = store.upsert(cred("b"));
        store.upsert(cred("c"));
        store.compare_and_set_status(&a.key, a.version, ValidationStatus::Valid, Utc::now());
        store.compare_and_set_status(&b.key, b.version, ValidationStatus::Valid, Utc::now());
        store.set_active(&b.key, false).unwrap();

        let usable: Vec<_> = store.active_valid().into_iter().map(|c| c.key.tenant_id).collect();
        assert_eq!(usable, vec!["a".to_string()]);
        let pending: Vec<_> = store.pending_validation().into_iter().map(|c| c.key.tenant_id).collect();
        assert_eq!(pending, vec!["c".to_string()]);
    }

    #[test]
    fn set_active_on_missing_row_errors() {
        let store = CredentialStore::new();
        let key = CredentialKey::new("x", "bybit", Environment::Production);
        assert!(matches!(store.set_active(&key, false), Err(GxError::CredentialNotFound(_))));
    }

    #[test]
    fn export_is_sorted_and_remove_works() {
        let store = CredentialStore::new();
        store.upsert(cred("zeta"));
        store.upsert(cred("alpha"));
        let rows: Vec<_> = store.export_rows().into_iter().map(|c| c.key.tenant_id).collect();
        assert_eq!(rows, vec!["alpha".to_string(), "zeta".to_string()]);

        let key = CredentialKey::new("alpha", "bybit", Environment::Production);
        assert!(store.remove(&key).is_some());
        assert!(!store.contains(&key));
        assert!(store.remove(&key).is_none());
    }

    #[tokio::test]
    async fn validation_lock_serializes_same_key() {
        let store = Arc::new(CredentialStore::new());
        let row = store.upsert(cred("t1"));

        let guard = store.lock_for_validation(&row.key).await.unwrap();
        let store2 = Arc::clone(&store);
        let key = row.key.clone();
        let waiter = tokio::spawn(async move {
            let _g = store2.lock_for_validation(&key).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }
}
