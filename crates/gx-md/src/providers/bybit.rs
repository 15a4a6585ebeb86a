//! Bybit v5 spot tickers (`GET /v5/market/tickers?category=spot`).
//!
//! `price24hPcnt` is a fraction (`0.0123` = 1.23%) and is scaled to percent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gx_core::transport::{DEFAULT_TIMEOUT, HttpRequest, HttpTransport};
use serde_json::Value;
use tracing::debug;

use super::{AssetChange, MarketDataProvider, get_json, select};
use crate::error::MdError;
use crate::json_util::{parse_f64_field, str_field};

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com";

pub struct BybitTickers {
    name: String,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl BybitTickers {
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
impl MarketDataProvider for BybitTickers {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_changes(&self, symbols: &[String]) -> Result<Vec<AssetChange>, MdError> {
        let query = match symbols {
            [one] => format!("category=spot&symbol={}", urlencoding::encode(one)),
            _ => "category=spot".to_string(),
        };
        let request = HttpRequest::get(format!("{}/v5/market/tickers", self.base_url))
            .with_query(query)
            .with_timeout(self.timeout);
        let payload = get_json(self.transport.as_ref(), request).await?;

        let code = payload.get("retCode").and_then(Value::as_i64).ok_or_else(|| MdError::Parse("missing retCode".into()))?;
        if code != 0 {
            let message = str_field(&payload, "retMsg").unwrap_or_default().to_string();
            return Err(MdError::Provider { code, message });
        }
        let list = payload
            .pointer("/result/list")
            .and_then(Value::as_array)
            .ok_or_else(|| MdError::Parse("missing result.list".into()))?;

        let rows: Vec<AssetChange> = list
            .iter()
            .filter_map(|row| Some(AssetChange::new(str_field(row, "symbol")?, parse_f64_field(row, "price24hPcnt")? * 100.0)))
            .collect();
        debug!("[md:{}] {} ticker rows", self.name, rows.len());
        Ok(select(symbols, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_core::transport::ReqwestTransport;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn scales_fraction_to_percent_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/market/tickers"))
            .and(query_param("category", "spot"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"retCode":0,"retMsg":"OK","result":{"category":"spot","list":[
                    {"symbol":"BTCUSDT","price24hPcnt":"0.0125"},
                    {"symbol":"ETHUSDT","price24hPcnt":"-0.02"},
                    {"symbol":"PEPEUSDT","price24hPcnt":"0.5"}]}}"#,
            ))
            .mount(&server)
            .await;

        let p = BybitTickers::new("bybit", Some(&server.uri()), Arc::new(ReqwestTransport::new()));
        let changes = p.fetch_changes(&["BTCUSDT".to_string(), "ETHUSDT".to_string()]).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].symbol, "BTCUSDT");
        assert!((changes[0].change_pct - 1.25).abs() < 1e-9);
        assert!((changes[1].change_pct + 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn nonzero_ret_code_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"retCode":10006,"retMsg":"Too many visits!"}"#))
            .mount(&server)
            .await;

        let p = BybitTickers::new("bybit", Some(&server.uri()), Arc::new(ReqwestTransport::new()));
        let err = p.fetch_changes(&["BTCUSDT".to_string()]).await.unwrap_err();
        assert_eq!(err, MdError::Provider { code: 10006, message: "Too many visits!".into() });
    }
}
