//! Source registry: builds the failover chain from config.

use std::sync::Arc;
use std::time::Duration;

use gx_core::config::{MarketConfig, MarketSourceConfig};
use gx_core::transport::HttpTransport;
use tracing::info;

use crate::aggregator::MarketAggregator;
use crate::error::MdError;
use crate::estimator::DegradedEstimator;
use crate::providers::MarketDataProvider;
use crate::providers::binance::BinanceTicker;
use crate::providers::bybit::BybitTickers;
use crate::providers::coingecko::CoinGeckoMarkets;

/// Create one provider from its `kind`.
pub fn create_source(
    config: &MarketSourceConfig,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
) -> Result<Arc<dyn MarketDataProvider>, MdError> {
    let name = config.display_name();
    let base = config.base_url.as_deref();
    let provider: Arc<dyn MarketDataProvider> = match config.kind.to_lowercase().as_str() {
        "binance" => Arc::new(BinanceTicker::new(name, base, transport).with_timeout(timeout)),
        "bybit" => Arc::new(BybitTickers::new(name, base, transport).with_timeout(timeout)),
        "coingecko" => Arc::new(CoinGeckoMarkets::new(name, base, transport).with_timeout(timeout)),
        other => return Err(MdError::UnknownSource(other.to_string())),
    };
    Ok(provider)
}

/// Build the aggregator described by `config`.
pub fn build_aggregator(config: &MarketConfig, transport: Arc<dyn HttpTransport>) -> Result<MarketAggregator, MdError> {
    let timeout = Duration::from_millis(config.attempt_timeout_ms);
    let providers = config
        .sources
        .iter()
        .map(|s| create_source(s, Arc::clone(&transport), timeout))
        .collect::<Result<Vec<_>, _>>()?;

    let references = match &config.reference_source {
        Some(source) => vec![create_source(source, Arc::clone(&transport), timeout)?],
        None => providers.clone(),
    };
    let estimator = DegradedEstimator::new(references, &config.reference_symbol, timeout);

    let names: Vec<_> = providers.iter().map(|p| p.name().to_string()).collect();
    info!("[aggregator] failover chain: {}", names.join(" -> "));

    Ok(MarketAggregator::new(providers, config.symbols.clone(), timeout, estimator)
        .with_cache_ttl(Duration::from_millis(config.cache_ttl_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_core::transport::ReqwestTransport;

    fn market(json: serde_json::Value) -> MarketConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn builds_chain_in_config_order() {
        let cfg = market(serde_json::json!({
            "sources": [{"kind": "bybit"}, {"kind": "Binance", "name": "binance-eu"}, {"kind": "coingecko"}]
        }));
        let agg = build_aggregator(&cfg, Arc::new(ReqwestTransport::new())).unwrap();
        assert_eq!(agg.provider_names(), vec!["bybit", "binance-eu", "coingecko"]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let cfg = market(serde_json::json!({ "sources": [{"kind": "kraken"}] }));
        assert!(matches!(
            build_aggregator(&cfg, Arc::new(ReqwestTransport::new())),
            Err(MdError::UnknownSource(k)) if k == "kraken"
        ));
    }
}
