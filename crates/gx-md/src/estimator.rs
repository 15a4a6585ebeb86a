//! Degraded-mode reference signal.
//!
//! When every primary provider has failed, the aggregator asks for the 24h
//! change of one reference asset with a single-symbol request, trying each
//! reference provider in order under the same per-attempt timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::providers::MarketDataProvider;

pub struct DegradedEstimator {
    references: Vec<Arc<dyn MarketDataProvider>>,
    symbol: String,
    attempt_timeout: Duration,
}

impl DegradedEstimator {
    pub fn new(references: Vec<Arc<dyn MarketDataProvider>>, symbol: impl Into<String>, attempt_timeout: Duration) -> Self {
        Self { references, symbol: symbol.into(), attempt_timeout }
    }

    /// An estimator that always yields the neutral value.
    pub fn neutral() -> Self {
        Self::new(Vec::new(), "BTCUSDT", Duration::from_secs(1))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// 24h change of the reference asset, `None` if no reference answered.
    pub async fn reference_change(&self) -> Option<f64> {
        let symbols = [self.symbol.clone()];
        for provider in &self.references {
            match tokio::time::timeout(self.attempt_timeout, provider.fetch_changes(&symbols)).await {
                Ok(Ok(changes)) => {
                    if let Some(c) = changes.into_iter().find(|c| c.symbol.eq_ignore_ascii_case(&self.symbol)) {
                        debug!("[estimator] {} 24h change {:.3}% via {}", self.symbol, c.change_pct, provider.name());
                        return Some(c.change_pct);
                    }
                }
                Ok(Err(e)) => debug!("[estimator] {} reference failed: {e}", provider.name()),
                Err(_) => debug!("[estimator] {} reference timed out", provider.name()),
            }
        }
        warn!("[estimator] no reference signal for {}, using neutral value", self.symbol);
        None
    }
}
