//! Market Aggregator.
//!
//! Per call: try `providers[0]`, then `providers[1]`, ... strictly in
//! priority order, one at a time, each under its own timeout. The first
//! provider that returns at least one usable asset resolves the call. If the
//! list is exhausted the result is the degraded estimate, flagged
//! `degraded: true` with no source provider. Consumers always get a value.
//!
//! A successful fetch computes every metric from the same asset set and
//! caches them for `cache_ttl`. Degraded results are never cached, so
//! recovery is picked up on the next call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gx_core::AggregationResult;
use gx_core::error::GxError;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::MdError;
use crate::estimator::DegradedEstimator;
use crate::metric::Metric;
use crate::providers::{AssetChange, MarketDataProvider};

pub struct MarketAggregator {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    symbols: Vec<String>,
    attempt_timeout: Duration,
    cache_ttl: Duration,
    estimator: DegradedEstimator,
    cache: Mutex<HashMap<Metric, AggregationResult>>,
}

impl MarketAggregator {
    pub fn new(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        symbols: Vec<String>,
        attempt_timeout: Duration,
        estimator: DegradedEstimator,
    ) -> Self {
        Self {
            providers,
            symbols,
            attempt_timeout,
            cache_ttl: Duration::ZERO,
            estimator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cache non-degraded results for `ttl` (zero disables caching).
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Current value of `metric`. Never fails.
    pub async fn get_metric(&self, metric: Metric) -> AggregationResult {
        if let Some(hit) = self.cached(metric) {
            debug!("[aggregator] {metric} served from cache ({})", hit.source_provider.as_deref().unwrap_or("-"));
            return hit;
        }

        let mut attempted = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let name = provider.name().to_string();
            attempted.push(name.clone());
            match self.attempt(provider.as_ref()).await {
                Ok(changes) => {
                    let results = self.resolve(&changes, &name, &attempted);
                    self.store(&results);
                    info!("[aggregator] {metric} resolved by {name} after {} attempt(s)", attempted.len());
                    if let Some(result) = results.into_iter().find(|r| r.metric_name == metric.name()) {
                        return result;
                    }
                }
                Err(e) => warn!("[aggregator] {name} failed for {metric}: {e}. Trying next provider"),
            }
        }

        let reference = self.estimator.reference_change().await;
        let value = metric.estimate(reference);
        warn!(
            "[aggregator] all {} provider(s) failed, degraded {metric} = {value:.2} (reference {} = {reference:?})",
            attempted.len(),
            self.estimator.symbol()
        );
        AggregationResult {
            metric_name: metric.name().to_string(),
            value,
            source_provider: None,
            computed_at: Utc::now(),
            degraded: true,
            attempted,
        }
    }

    /// Same as [`get_metric`](Self::get_metric) for a metric given by name.
    pub async fn get_metric_by_name(&self, name: &str) -> Result<AggregationResult, GxError> {
        let metric: Metric = name.parse()?;
        Ok(self.get_metric(metric).await)
    }

    async fn attempt(&self, provider: &dyn MarketDataProvider) -> Result<Vec<AssetChange>, MdError> {
        let changes = tokio::time::timeout(self.attempt_timeout, provider.fetch_changes(&self.symbols))
            .await
            .map_err(|_| MdError::Timeout(self.attempt_timeout.as_millis() as u64))??;
        if changes.is_empty() {
            return Err(MdError::NoAssets);
        }
        Ok(changes)
    }

    fn resolve(&self, changes: &[AssetChange], source: &str, attempted: &[String]) -> Vec<AggregationResult> {
        let computed_at = Utc::now();
        Metric::ALL
            .into_iter()
            .filter_map(|m| {
                Some(AggregationResult {
                    metric_name: m.name().to_string(),
                    value: m.compute(changes)?,
                    source_provider: Some(source.to_string()),
                    computed_at,
                    degraded: false,
                    attempted: attempted.to_vec(),
                })
            })
            .collect()
    }

    fn cached(&self, metric: Metric) -> Option<AggregationResult> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let cache = self.cache.lock();
        let hit = cache.get(&metric)?;
        let age = hit.age(Utc::now()).to_std().unwrap_or_default();
        (age < self.cache_ttl).then(|| hit.clone())
    }

    fn store(&self, results: &[AggregationResult]) {
        if self.cache_ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock();
        for r in results {
            if let Ok(metric) = r.metric_name.parse::<Metric>() {
                cache.insert(metric, r.clone());
            }
        }
    }
}
