//! Market Aggregator output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One derived metric value.
///
/// Immutable once produced; a newer result replaces an older one rather than
/// mutating it. `source_provider` is `None` exactly when `degraded` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub metric_name: String,
    pub value: f64,
    pub source_provider: Option<String>,
    pub computed_at: DateTime<Utc>,
    pub degraded: bool,
    /// Provider names in the order they were tried for this result.
    #[serde(default)]
    pub attempted: Vec<String>,
}

impl AggregationResult {
    /// Age of this result relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.computed_at
    }
}
