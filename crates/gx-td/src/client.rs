//! Provider Client.
//!
//! Wraps the [`Signer`] and an injected [`HttpTransport`] to call one
//! provider operation and classify the reply. A client never mutates
//! credential state and never returns an error: every call yields exactly
//! one [`OutcomeEnvelope`] variant.
//!
//! # Default endpoints
//!
//! | Convention      | Balance                          | Positions                                | Order history                              | Market ticks            |
//! |-----------------|----------------------------------|------------------------------------------|--------------------------------------------|-------------------------|
//! | `binance_hmac`  | `/api/v3/account`                | -                                        | `/api/v3/allOrders`                        | `/api/v3/ticker/24hr`   |
//! | `bybit_v5`      | `/v5/account/wallet-balance`     | `/v5/position/list`                      | `/v5/order/history`                        | `/v5/market/tickers`    |
//! | `mexc_contract` | `/api/v1/private/account/assets` | `/api/v1/private/position/open_positions`| `/api/v1/private/order/list/history_orders`| `/api/v1/contract/ticker`|
//!
//! Any of them can be overridden per descriptor under the operation label.
//! An override path may be an absolute URL. Binance positions live on the
//! futures host, so they need one, e.g.
//! `"positions": {"path": "https://fapi.binance.com/fapi/v3/positionRisk"}`.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use gx_core::error::GxError;
use gx_core::time_util;
use gx_core::transport::{HttpRequest, HttpTransport};
use gx_core::{Credential, Endpoint, HttpMethod, ProviderDescriptor, SigningConvention};
use tracing::{debug, info, warn};

use crate::outcome::{OutcomeEnvelope, classify};
use crate::signer::{Params, SignInput, Signer, canonical_query};

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Provider operations the gateway knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Balance,
    Positions,
    OrderHistory,
    /// Public ticker snapshot; sent unsigned.
    MarketTicks,
}

impl Operation {
    /// Label used for endpoint overrides in config.
    pub fn label(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Positions => "positions",
            Self::OrderHistory => "order_history",
            Self::MarketTicks => "market_ticks",
        }
    }

    pub fn signed(self) -> bool {
        !matches!(self, Self::MarketTicks)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

struct DefaultEndpoint {
    path: &'static str,
    params: &'static [(&'static str, &'static str)],
}

const fn ep(path: &'static str, params: &'static [(&'static str, &'static str)]) -> DefaultEndpoint {
    DefaultEndpoint { path, params }
}

fn default_endpoint(convention: SigningConvention, op: Operation) -> Option<DefaultEndpoint> {
    use Operation::*;
    use SigningConvention::*;
    Some(match (convention, op) {
        (BinanceHmac, Balance) => ep("/api/v3/account", &[("omitZeroBalances", "true")]),
        (BinanceHmac, Positions) => return None,
        (BinanceHmac, OrderHistory) => ep("/api/v3/allOrders", &[("symbol", "BTCUSDT")]),
        (BinanceHmac, MarketTicks) => ep("/api/v3/ticker/24hr", &[]),
        (BybitV5, Balance) => ep("/v5/account/wallet-balance", &[("accountType", "UNIFIED")]),
        (BybitV5, Positions) => ep("/v5/position/list", &[("category", "linear"), ("settleCoin", "USDT")]),
        (BybitV5, OrderHistory) => ep("/v5/order/history", &[("category", "spot")]),
        (BybitV5, MarketTicks) => ep("/v5/market/tickers", &[("category", "spot")]),
        (MexcContract, Balance) => ep("/api/v1/private/account/assets", &[]),
        (MexcContract, Positions) => ep("/api/v1/private/position/open_positions", &[]),
        (MexcContract, OrderHistory) => ep("/api/v1/private/order/list/history_orders", &[("page_num", "1"), ("page_size", "20")]),
        (MexcContract, MarketTicks) => ep("/api/v1/contract/ticker", &[]),
    })
}

// ---------------------------------------------------------------------------
// ProviderClient
// ---------------------------------------------------------------------------

/// Calls one provider on behalf of any of its credentials.
pub struct ProviderClient {
    descriptor: Arc<ProviderDescriptor>,
    signer: Arc<Signer>,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient").field("provider", &self.descriptor.name).finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Fails if the descriptor names a convention the signer cannot sign.
    pub fn new(
        descriptor: Arc<ProviderDescriptor>,
        signer: Arc<Signer>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GxError> {
        if let Some(convention) = descriptor.signing_convention {
            if !signer.supports(convention) {
                return Err(GxError::Config(format!(
                    "provider '{}' uses signing convention {convention} but no scheme is registered",
                    descriptor.name
                )));
            }
        }
        Ok(Self { descriptor, signer, transport })
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.descriptor.timeout_ms)
    }

    /// Resolve `(method, path, params)`: configured override first, then the
    /// convention default. Caller params win over default params.
    fn resolve(&self, op: Operation, params: &Params) -> Option<(HttpMethod, String, Params)> {
        if let Some(Endpoint { method, path }) = self.descriptor.endpoint_override(op.label()) {
            return Some((*method, path.clone(), params.clone()));
        }
        let default = default_endpoint(self.descriptor.signing_convention?, op)?;
        let mut merged: Params = default.params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        Some((HttpMethod::Get, default.path.to_string(), merged))
    }

    fn build_request(&self, credential: &Credential, op: Operation, params: &Params) -> Result<HttpRequest, OutcomeEnvelope> {
        let Some((method, path, params)) = self.resolve(op, params) else {
            return Err(OutcomeEnvelope::MalformedResponse(format!(
                "operation {op} has no endpoint for provider '{}'",
                self.descriptor.name
            )));
        };
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.clone()
        } else {
            format!("{}{}", self.descriptor.base_url, path)
        };

        // Query-carrying methods put params in the query, others in the body.
        let empty = Params::new();
        let (query, body) = if method.uses_query() { (&params, &empty) } else { (&empty, &params) };

        if !op.signed() {
            return Ok(HttpRequest {
                method,
                url,
                query: canonical_query(query),
                headers: Vec::new(),
                body: crate::signer::body_json(body),
                timeout: self.timeout(),
            });
        }

        let Some(convention) = self.descriptor.signing_convention else {
            return Err(OutcomeEnvelope::AuthError {
                code: 0,
                message: format!("provider '{}' has no signing convention", self.descriptor.name),
            });
        };
        let input = SignInput { method, path: &path, query, body, recv_window: Some(self.descriptor.recv_window_ms) };
        let ctx = self
            .signer
            .sign(credential, convention, &input)
            .map_err(|e| OutcomeEnvelope::AuthError { code: 0, message: e.to_string() })?;

        Ok(HttpRequest { method, url, query: ctx.query, headers: ctx.headers, body: ctx.body, timeout: self.timeout() })
    }

    /// Perform one call. Never panics, never returns an error.
    pub async fn call(&self, credential: &Credential, op: Operation, params: &Params) -> OutcomeEnvelope {
        if credential.key.provider != self.descriptor.name {
            return OutcomeEnvelope::AuthError {
                code: 0,
                message: format!(
                    "credential for '{}' used against provider '{}'",
                    credential.key.provider, self.descriptor.name
                ),
            };
        }

        let request = match self.build_request(credential, op, params) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };
        let url = request.url.clone();
        let timeout = request.timeout;

        let outcome = match tokio::time::timeout(timeout, self.transport.execute(request)).await {
            Ok(Ok(resp)) => classify(self.descriptor.signing_convention, &resp, time_util::now_ms()),
            Ok(Err(e)) => e.into(),
            Err(_) => OutcomeEnvelope::NetworkError(format!("request timed out after {} ms", timeout.as_millis())),
        };

        if outcome.is_success() {
            debug!("[client] {} {op} for {} ok", self.descriptor.name, credential.key);
        } else {
            warn!("[client] {} {op} for {} -> {} ({url})", self.descriptor.name, credential.key, outcome.detail());
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// ProviderClients
// ---------------------------------------------------------------------------

/// One client per configured provider, keyed by provider name.
#[derive(Debug, Default)]
pub struct ProviderClients {
    clients: AHashMap<String, Arc<ProviderClient>>,
}

impl ProviderClients {
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ProviderDescriptor>,
        signer: Arc<Signer>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GxError> {
        let mut clients = AHashMap::new();
        for descriptor in descriptors {
            match descriptor.rate_limit_hint {
                Some(rpm) => info!("[client] provider '{}' at {} (~{rpm} req/min)", descriptor.name, descriptor.base_url),
                None => info!("[client] provider '{}' at {}", descriptor.name, descriptor.base_url),
            }
            let client = ProviderClient::new(Arc::new(descriptor), Arc::clone(&signer), Arc::clone(&transport))?;
            clients.insert(client.name().to_string(), Arc::new(client));
        }
        Ok(Self { clients })
    }

    pub fn get(&self, provider: &str) -> Option<Arc<ProviderClient>> {
        self.clients.get(provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::test_support::credential;
    use crate::testing::FakeTransport;
    use gx_core::error::TransportError;
    use gx_core::transport::{HttpResponse, ReqwestTransport};
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BYBIT_KEY: &str = "A1b2C3d4E5f6G7h8I9";
    const BYBIT_SECRET: &str = "S3cr3tS3cr3tS3cr3tS3cr3tS3cr3tS3cr3t";

    fn client(desc: ProviderDescriptor, transport: Arc<dyn HttpTransport>) -> ProviderClient {
        ProviderClient::new(Arc::new(desc), Arc::new(Signer::with_builtin()), transport).unwrap()
    }

    #[tokio::test]
    async fn bybit_balance_is_signed_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/account/wallet-balance"))
            .and(query_param("accountType", "UNIFIED"))
            .and(header("X-BAPI-API-KEY", BYBIT_KEY))
            .and(header("X-BAPI-SIGN-TYPE", "2"))
            .and(header_exists("X-BAPI-SIGN"))
            .and(header_exists("X-BAPI-TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"retCode":0,"retMsg":"OK","result":{"list":[]}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(
            fixtures::descriptor("bybit", SigningConvention::BybitV5, &server.uri()),
            Arc::new(ReqwestTransport::new()),
        );
        let outcome = c.call(&credential("bybit", BYBIT_KEY, BYBIT_SECRET), Operation::Balance, &Params::new()).await;
        assert!(outcome.is_success(), "{outcome:?}");
    }

    #[tokio::test]
    async fn binance_signature_goes_into_query() {
        let fake = Arc::new(FakeTransport::ok(r#"{"balances":[]}"#));
        let c = client(fixtures::descriptor("binance", SigningConvention::BinanceHmac, "http://fake"), fake.clone());
        let cred = credential("binance", &"k".repeat(64), &"s".repeat(64));
        assert!(c.call(&cred, Operation::Balance, &Params::new()).await.is_success());

        let req = &fake.requests()[0];
        assert_eq!(req.url, "http://fake/api/v3/account");
        assert!(req.query.starts_with("omitZeroBalances=true&recvWindow=5000&timestamp="));
        assert!(req.query.contains("&signature="));
        assert!(req.headers.iter().any(|(k, v)| k == "X-MBX-APIKEY" && v == &"k".repeat(64)));
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn market_ticks_are_unsigned() {
        let fake = Arc::new(FakeTransport::ok(r#"{"retCode":0,"result":{"list":[]}}"#));
        let c = client(fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://fake"), fake.clone());
        c.call(&credential("bybit", BYBIT_KEY, BYBIT_SECRET), Operation::MarketTicks, &Params::new()).await;

        let req = &fake.requests()[0];
        assert_eq!(req.url, "http://fake/v5/market/tickers");
        assert_eq!(req.query, "category=spot");
        assert!(req.headers.is_empty());
    }

    #[tokio::test]
    async fn endpoint_override_is_used() {
        let fake = Arc::new(FakeTransport::ok(r#"{"success":true,"code":0,"data":[]}"#));
        let mut desc = fixtures::descriptor("mexc", SigningConvention::MexcContract, "http://fake");
        desc.endpoints.insert("balance".into(), Endpoint::get("/api/v1/private/account/asset/USDT"));
        let c = client(desc, fake.clone());
        let outcome = c
            .call(&credential("mexc", "mx0vglABCDEFGHIJKL", "0123456789abcdef0123456789abcdef"), Operation::Balance, &Params::new())
            .await;
        assert!(outcome.is_success());
        assert_eq!(fake.requests()[0].url, "http://fake/api/v1/private/account/asset/USDT");
        assert!(fake.requests()[0].headers.iter().any(|(k, _)| k == "Signature"));
    }

    #[tokio::test]
    async fn binance_positions_need_a_futures_override() {
        const KEY: &str = "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A";
        const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let fake = Arc::new(FakeTransport::ok("[]"));
        let cred = credential("binance", KEY, SECRET);

        let spot = client(fixtures::descriptor("binance", SigningConvention::BinanceHmac, "http://spot"), fake.clone());
        let outcome = spot.call(&cred, Operation::Positions, &Params::new()).await;
        assert!(matches!(outcome, OutcomeEnvelope::MalformedResponse(ref m) if m.contains("no endpoint")));
        assert_eq!(fake.calls(), 0);

        let mut desc = fixtures::descriptor("binance", SigningConvention::BinanceHmac, "http://spot");
        desc.endpoints.insert("positions".into(), Endpoint::get("http://futures/fapi/v3/positionRisk"));
        let futures = client(desc, fake.clone());
        assert!(futures.call(&cred, Operation::Positions, &Params::new()).await.is_success());
        assert_eq!(fake.requests()[0].url, "http://futures/fapi/v3/positionRisk");
        assert!(fake.requests()[0].query.contains("signature="));
    }

    #[tokio::test]
    async fn transport_failures_become_network_errors() {
        let fake = Arc::new(FakeTransport::always(Err(TransportError::Connect("refused".into()))));
        let c = client(fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://fake"), fake);
        let outcome = c.call(&credential("bybit", BYBIT_KEY, BYBIT_SECRET), Operation::Positions, &Params::new()).await;
        assert!(matches!(outcome, OutcomeEnvelope::NetworkError(_)));
    }

    #[tokio::test]
    async fn slow_transport_hits_the_call_timeout() {
        let fake = Arc::new(FakeTransport::ok("{}").with_delay(Duration::from_millis(500)));
        let mut desc = fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://fake");
        desc.timeout_ms = 50;
        let c = client(desc, fake);
        let outcome = c.call(&credential("bybit", BYBIT_KEY, BYBIT_SECRET), Operation::Balance, &Params::new()).await;
        assert!(matches!(outcome, OutcomeEnvelope::NetworkError(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn wrong_provider_and_empty_secret_never_hit_the_network() {
        let fake = Arc::new(FakeTransport::ok("{}"));
        let c = client(fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://fake"), fake.clone());

        let other = credential("mexc", BYBIT_KEY, BYBIT_SECRET);
        assert!(matches!(c.call(&other, Operation::Balance, &Params::new()).await, OutcomeEnvelope::AuthError { code: 0, .. }));
        let blank = credential("bybit", BYBIT_KEY, "");
        assert!(matches!(c.call(&blank, Operation::Balance, &Params::new()).await, OutcomeEnvelope::AuthError { code: 0, .. }));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn http_403_classified_as_ip_restricted() {
        let fake = Arc::new(FakeTransport::always(Ok(HttpResponse::new(403, "Forbidden"))));
        let c = client(fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://fake"), fake);
        let outcome = c.call(&credential("bybit", BYBIT_KEY, BYBIT_SECRET), Operation::Balance, &Params::new()).await;
        assert!(matches!(outcome, OutcomeEnvelope::IpRestricted { .. }));
    }

    #[test]
    fn unregistered_convention_is_a_config_error() {
        let desc = fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://fake");
        let err = ProviderClient::new(Arc::new(desc), Arc::new(Signer::empty()), Arc::new(FakeTransport::ok("{}"))).unwrap_err();
        assert!(matches!(err, GxError::Config(_)));
    }

    #[test]
    fn registry_is_keyed_by_name() {
        let clients = ProviderClients::from_descriptors(
            vec![
                fixtures::descriptor("bybit", SigningConvention::BybitV5, "http://a"),
                fixtures::descriptor("mexc", SigningConvention::MexcContract, "http://b"),
            ],
            Arc::new(Signer::with_builtin()),
            Arc::new(FakeTransport::ok("{}")),
        )
        .unwrap();
        assert_eq!(clients.names(), vec!["bybit".to_string(), "mexc".to_string()]);
        assert!(clients.get("bybit").is_some());
        assert!(clients.get("okx").is_none());
    }
}
