use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use gx_core::bus::GatewayEvent;
use gx_md::{MarketAggregator, Metric};
use tracing::{debug, warn};

use crate::manager::{Manager, RunContext};

/// Polls the aggregator and publishes one `MetricUpdated` per metric.
pub struct MarketPulseManager {
    aggregator: Arc<MarketAggregator>,
    metrics: Vec<Metric>,
    interval: Duration,
}

impl MarketPulseManager {
    pub fn new(aggregator: Arc<MarketAggregator>, interval: Duration) -> Self {
        Self { aggregator, metrics: Metric::ALL.to_vec(), interval }
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl Manager for MarketPulseManager {
    fn name(&self) -> &str {
        "market-pulse"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self, ctx: &RunContext) -> Result<()> {
        for metric in &self.metrics {
            ctx.checkpoint()?;
            let result = self.aggregator.get_metric(*metric).await;
            if result.degraded {
                warn!("[pulse] {metric} degraded: {:.2}", result.value);
            } else {
                debug!(
                    "[pulse] {metric} = {:.2} via {}",
                    result.value,
                    result.source_provider.as_deref().unwrap_or("-")
                );
            }
            ctx.publish(GatewayEvent::MetricUpdated(result));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSource;
    use gx_core::bus::EventBus;
    use gx_md::{AssetChange, DegradedEstimator, MdError};

    fn aggregator(sources: Vec<Arc<StaticSource>>) -> Arc<MarketAggregator> {
        let providers = sources.into_iter().map(|s| s as Arc<dyn gx_md::MarketDataProvider>).collect();
        Arc::new(MarketAggregator::new(
            providers,
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            Duration::from_millis(200),
            DegradedEstimator::neutral(),
        ))
    }

    #[tokio::test]
    async fn publishes_every_metric() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe("pulse");
        let source = StaticSource::new(
            "primary",
            Ok(vec![AssetChange::new("BTCUSDT", 4.0), AssetChange::new("ETHUSDT", -2.0)]),
        );
        let manager = MarketPulseManager::new(aggregator(vec![source]), Duration::from_secs(30));

        manager.run_once(&RunContext::for_test(bus)).await.unwrap();

        let mut names = Vec::new();
        while let Some(GatewayEvent::MetricUpdated(r)) = sub.try_recv() {
            assert!(!r.degraded);
            assert_eq!(r.source_provider.as_deref(), Some("primary"));
            if r.metric_name == Metric::MarketPulse.name() {
                assert_eq!(r.value, 50.0);
            } else {
                assert_eq!(r.value, 1.0);
            }
            names.push(r.metric_name);
        }
        assert_eq!(names, Metric::ALL.iter().map(|m| m.name().to_string()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn degraded_result_is_still_published() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe("pulse");
        let down = StaticSource::new("down", Err(MdError::Timeout(200)));
        let manager = MarketPulseManager::new(aggregator(vec![down]), Duration::from_secs(30))
            .with_metrics(vec![Metric::MarketPulse]);

        manager.run_once(&RunContext::for_test(bus)).await.unwrap();

        match sub.try_recv() {
            Some(GatewayEvent::MetricUpdated(r)) => {
                assert!(r.degraded);
                assert_eq!(r.value, 50.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn stops_between_metrics_once_cancelled() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe("pulse");
        let source = StaticSource::new("primary", Ok(vec![AssetChange::new("BTCUSDT", 1.0)]));
        let manager = MarketPulseManager::new(aggregator(vec![source.clone()]), Duration::from_secs(30));

        let ctx = RunContext::for_test(bus);
        ctx.cancellation().cancel();
        assert!(manager.run_once(&ctx).await.is_err());
        assert!(sub.try_recv().is_none());
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
