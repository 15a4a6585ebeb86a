//! # gx-md
//!
//! Market data with failover.
//!
//! ## Architecture
//!
//! Each source implements [`MarketDataProvider`] over one public REST call.
//! The [`MarketAggregator`] tries the configured sources in priority order
//! and falls back to a [`DegradedEstimator`] when all of them fail, so
//! `get_metric` always yields a value.
//!
//! ## Sources
//!
//! | Kind        | Endpoint                  |
//! |-------------|---------------------------|
//! | `binance`   | `/api/v3/ticker/24hr`     |
//! | `bybit`     | `/v5/market/tickers`      |
//! | `coingecko` | `/api/v3/coins/markets`   |

pub mod aggregator;
pub mod error;
pub mod estimator;
pub mod json_util;
pub mod metric;
pub mod providers;
pub mod registry;

pub use aggregator::MarketAggregator;
pub use error::MdError;
pub use estimator::DegradedEstimator;
pub use metric::Metric;
pub use providers::{AssetChange, MarketDataProvider};
pub use registry::{build_aggregator, create_source};
