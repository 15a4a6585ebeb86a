//! Binance public 24h ticker (`GET /api/v3/ticker/24hr`).
//!
//! One symbol is requested with `symbol=`, several with a JSON-array
//! `symbols=` parameter. The change is `priceChangePercent`, already in
//! percent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gx_core::transport::{DEFAULT_TIMEOUT, HttpRequest, HttpTransport};
use serde_json::Value;
use tracing::debug;

use super::{AssetChange, MarketDataProvider, get_json, select};
use crate::error::MdError;
use crate::json_util::{parse_f64_field, str_field};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

pub struct BinanceTicker {
    name: String,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl BinanceTicker {
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

fn query_for(symbols: &[String]) -> String {
    match symbols {
        [one] => format!("symbol={}", urlencoding::encode(one)),
        many => {
            let list = many.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(",");
            format!("symbols={}", urlencoding::encode(&format!("[{list}]")))
        }
    }
}

fn parse_row(row: &Value) -> Option<AssetChange> {
    Some(AssetChange::new(str_field(row, "symbol")?, parse_f64_field(row, "priceChangePercent")?))
}

#[async_trait]
impl MarketDataProvider for BinanceTicker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_changes(&self, symbols: &[String]) -> Result<Vec<AssetChange>, MdError> {
        let request = HttpRequest::get(format!("{}/api/v3/ticker/24hr", self.base_url))
            .with_query(query_for(symbols))
            .with_timeout(self.timeout);
        let payload = get_json(self.transport.as_ref(), request).await?;

        if let Some(code) = payload.get("code").and_then(Value::as_i64) {
            let message = str_field(&payload, "msg").unwrap_or_default().to_string();
            return Err(MdError::Provider { code, message });
        }
        let rows: Vec<AssetChange> = match &payload {
            Value::Array(rows) => rows.iter().filter_map(parse_row).collect(),
            obj @ Value::Object(_) => parse_row(obj).into_iter().collect(),
            _ => return Err(MdError::Parse("expected array or object".into())),
        };
        debug!("[md:{}] {} ticker rows", self.name, rows.len());
        Ok(select(symbols, rows))
    }
}
