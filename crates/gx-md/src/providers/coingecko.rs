//! CoinGecko markets (`GET /api/v3/coins/markets`).
//!
//! CoinGecko keys assets by coin id, so pairs are mapped through their base
//! asset (`BTCUSDT` -> `btc` -> `bitcoin`). Pairs without a known id are
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gx_core::transport::{DEFAULT_TIMEOUT, HttpRequest, HttpTransport};
use tracing::debug;

use super::{AssetChange, MarketDataProvider, get_json};
use crate::error::MdError;
use crate::json_util::{parse_f64_field, str_field};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";

const QUOTES: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];

const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("TRX", "tron"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
];

/// `BTCUSDT` -> `bitcoin`.
pub fn coin_id(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_ascii_uppercase();
    let base = QUOTES.iter().find_map(|q| upper.strip_suffix(q)).unwrap_or(&upper);
    COIN_IDS.iter().find(|(b, _)| *b == base).map(|(_, id)| *id)
}

pub struct CoinGeckoMarkets {
    name: String,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl CoinGeckoMarkets {
    pub fn new(name: impl Into<String>, base_url: Option<&str>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoMarkets {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_changes(&self, symbols: &[String]) -> Result<Vec<AssetChange>, MdError> {
        let wanted: Vec<(&String, &str)> = symbols.iter().filter_map(|s| Some((s, coin_id(s)?))).collect();
        if wanted.is_empty() {
            return Err(MdError::NoAssets);
        }
        let ids = wanted.iter().map(|(_, id)| *id).collect::<Vec<_>>().join(",");
        let request = HttpRequest::get(format!("{}/api/v3/coins/markets", self.base_url))
            .with_query(format!("vs_currency=usd&ids={}&price_change_percentage=24h", urlencoding::encode(&ids)))
            .with_timeout(self.timeout);
        let payload = get_json(self.transport.as_ref(), request).await?;
        let rows = payload.as_array().ok_or_else(|| MdError::Parse("expected array".into()))?;

        let find = |id: &str| -> Option<f64> {
            let row = rows.iter().find(|r| str_field(r, "id") == Some(id))?;
            parse_f64_field(row, "price_change_percentage_24h")
        };
        let changes: Vec<AssetChange> = wanted
            .iter()
            .filter_map(|(symbol, id)| Some(AssetChange::new(symbol.as_str(), find(*id)?)))
            .collect();
        debug!("[md:{}] {} of {} assets priced", self.name, changes.len(), symbols.len());
        Ok(changes)
    }
}
