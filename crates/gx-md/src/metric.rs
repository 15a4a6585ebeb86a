//! Derived market metrics.
//!
//! | Metric          | Formula                                    | Bounds        | Degraded (reference change `r`) |
//! |-----------------|--------------------------------------------|---------------|---------------------------------|
//! | `marketPulse`   | 100 x assets with change > 0 / assets      | `[0, 100]`    | `clamp(50 + 10 r, 0, 100)`      |
//! | `averageChange` | mean 24h % change                          | `[-100, 100]` | `clamp(r, -100, 100)`           |
//!
//! Without a reference signal the degraded value is the neutral one
//! (50 and 0 respectively).

use std::str::FromStr;

use gx_core::error::GxError;

use crate::providers::AssetChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    MarketPulse,
    AverageChange,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Self::MarketPulse, Self::AverageChange];

    pub fn name(self) -> &'static str {
        match self {
            Self::MarketPulse => "marketPulse",
            Self::AverageChange => "averageChange",
        }
    }

    pub fn bounds(self) -> (f64, f64) {
        match self {
            Self::MarketPulse => (0.0, 100.0),
            Self::AverageChange => (-100.0, 100.0),
        }
    }

    pub fn neutral(self) -> f64 {
        match self {
            Self::MarketPulse => 50.0,
            Self::AverageChange => 0.0,
        }
    }

    fn clamp(self, v: f64) -> f64 {
        let (lo, hi) = self.bounds();
        v.clamp(lo, hi)
    }

    /// Value from a non-empty set of changes. `None` if `changes` is empty.
    pub fn compute(self, changes: &[AssetChange]) -> Option<f64> {
        if changes.is_empty() {
            return None;
        }
        let n = changes.len() as f64;
        let v = match self {
            Self::MarketPulse => 100.0 * changes.iter().filter(|c| c.change_pct > 0.0).count() as f64 / n,
            Self::AverageChange => changes.iter().map(|c| c.change_pct).sum::<f64>() / n,
        };
        Some(self.clamp(v))
    }

    /// Degraded estimate from the reference asset's change.
    pub fn estimate(self, reference_change: Option<f64>) -> f64 {
        let Some(r) = reference_change.filter(|r| r.is_finite()) else {
            return self.neutral();
        };
        match self {
            Self::MarketPulse => self.clamp(50.0 + 10.0 * r),
            Self::AverageChange => self.clamp(r),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = GxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| GxError::UnknownMetric(s.to_string()))
    }
}
