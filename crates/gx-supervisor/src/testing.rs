//! Doubles for the manager tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use gx_core::error::TransportError;
use gx_core::store::CredentialStore;
use gx_core::transport::{HttpRequest, HttpResponse, HttpTransport};
use gx_core::{CredentialKey, CredentialSubmission, Environment, ProviderDescriptor, SigningConvention, ValidationStatus};
use gx_md::{AssetChange, MarketDataProvider, MdError};
use gx_td::{ProviderClients, Signer};
use parking_lot::Mutex;

pub const KEY: &str = "A1b2C3d4E5f6G7h8I9";
pub const SECRET: &str = "S3cr3tS3cr3tS3cr3tS3cr3tS3cr3tS3cr3t";

pub const BYBIT_OK: &str = r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"totalEquity":"12.5"}]}}"#;
pub const BYBIT_BAD_KEY: &str = r#"{"retCode":10003,"retMsg":"API key is invalid."}"#;

/// Replays queued bodies per API key header, then falls back to `default`.
pub struct FakeTransport {
    default: String,
    by_key: Mutex<HashMap<String, VecDeque<String>>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(default: &str) -> Arc<Self> {
        Arc::new(Self { default: default.into(), by_key: Mutex::new(HashMap::new()), calls: AtomicUsize::new(0) })
    }

    pub fn script(&self, api_key: &str, bodies: &[&str]) {
        self.by_key.lock().insert(api_key.into(), bodies.iter().map(|b| b.to_string()).collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = request.headers.iter().find(|(k, _)| k == "X-BAPI-API-KEY").map(|(_, v)| v.clone());
        let scripted = key.and_then(|k| self.by_key.lock().get_mut(&k).and_then(VecDeque::pop_front));
        Ok(HttpResponse::new(200, scripted.unwrap_or_else(|| self.default.clone())))
    }
}

pub fn bybit_clients(transport: Arc<FakeTransport>) -> Arc<ProviderClients> {
    let descriptor = ProviderDescriptor {
        name: "bybit".into(),
        base_url: "http://fake".into(),
        signing_convention: Some(SigningConvention::BybitV5),
        rate_limit_hint: None,
        authenticated: true,
        key_format: None,
        endpoints: HashMap::new(),
        recv_window_ms: 5000,
        timeout_ms: 1000,
    };
    let clients = ProviderClients::from_descriptors(vec![descriptor], Arc::new(Signer::with_builtin()), transport)
        .expect("bybit is a built-in convention");
    Arc::new(clients)
}

/// Store `tenant`'s bybit credential with the given status. `api_key` must
/// stay within the bybit key format.
pub fn seed(store: &CredentialStore, tenant: &str, api_key: &str, status: ValidationStatus) -> CredentialKey {
    let submission = CredentialSubmission {
        tenant_id: tenant.into(),
        provider: "bybit".into(),
        environment: Environment::Production,
        api_key: api_key.into(),
        api_secret: SECRET.into(),
    };
    let row = store.upsert(submission.into_credential());
    if status != ValidationStatus::Unvalidated {
        store.compare_and_set_status(&row.key, row.version, status, Utc::now());
    }
    row.key
}

pub fn status_of(store: &CredentialStore, key: &CredentialKey) -> Option<ValidationStatus> {
    store.get(key).map(|c| c.validation_status)
}

/// Market source with a fixed reply.
pub struct StaticSource {
    pub name: &'static str,
    pub reply: Result<Vec<AssetChange>, MdError>,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &'static str, reply: Result<Vec<AssetChange>, MdError>) -> Arc<Self> {
        Arc::new(Self { name, reply, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl MarketDataProvider for StaticSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_changes(&self, _symbols: &[String]) -> Result<Vec<AssetChange>, MdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}
