//! Market-data providers.
//!
//! Each provider turns one public REST call into a list of 24h percentage
//! changes for the requested symbols. Symbols are exchange-style pairs
//! (`BTCUSDT`); providers that key assets differently map them internally.
//! Assets a provider does not know are skipped, not reported as errors.

pub mod binance;
pub mod bybit;
pub mod coingecko;

use async_trait::async_trait;
use gx_core::transport::{HttpRequest, HttpTransport};
use serde::Serialize;
use serde_json::Value;

use crate::error::MdError;

/// 24h price change of one asset, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetChange {
    pub symbol: String,
    pub change_pct: f64,
}

impl AssetChange {
    pub fn new(symbol: impl Into<String>, change_pct: f64) -> Self {
        Self { symbol: symbol.into(), change_pct }
    }
}

/// One entry of the market-data failover chain.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider needs a credential. The built-in ones do not.
    fn authenticated(&self) -> bool {
        false
    }

    /// 24h changes for `symbols`. An empty list counts as a failure upstream.
    async fn fetch_changes(&self, symbols: &[String]) -> Result<Vec<AssetChange>, MdError>;
}

/// Execute a GET and parse the body as JSON; non-2xx is an error.
pub(crate) async fn get_json(transport: &dyn HttpTransport, request: HttpRequest) -> Result<Value, MdError> {
    let resp = transport.execute(request).await?;
    if !resp.is_success() {
        let body: String = resp.body.chars().take(200).collect();
        return Err(MdError::Status { status: resp.status, body });
    }
    serde_json::from_str(&resp.body).map_err(|e| MdError::Parse(e.to_string()))
}

/// Keep only requested symbols, in request order.
pub(crate) fn select(symbols: &[String], mut found: Vec<AssetChange>) -> Vec<AssetChange> {
    symbols
        .iter()
        .filter_map(|s| found.iter().position(|c| c.symbol.eq_ignore_ascii_case(s)).map(|i| found.swap_remove(i)))
        .collect()
}
