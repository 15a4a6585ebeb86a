//! Configuration parsing for the gateway.
//!
//! Everything is read from a single JSON file. The top level holds logging
//! metadata, the `providers` array (one entry per authenticated or public
//! provider), the ordered market-data `sources`, supervisor timings and an
//! optional credentials file for startup ingestion.
//!
//! # Example config
//!
//! ```json
//! {
//!   "gateway": { "module_name": "gx", "log_path": "/tmp/log" },
//!   "providers": [
//!     { "name": "bybit", "base_url": "https://api.bybit.com", "signing_convention": "bybit_v5" }
//!   ],
//!   "market": {
//!     "sources": [{ "kind": "binance" }, { "kind": "coingecko" }],
//!     "symbols": ["BTCUSDT", "ETHUSDT"]
//!   },
//!   "supervisor": { "pulse_interval_ms": 60000 },
//!   "credentials_file": "credentials.json"
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{GxError, Result};
use crate::types::{CredentialSubmission, Endpoint, KeyFormat, ProviderDescriptor, SigningConvention};

/// Top-level application config.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub gateway: Option<ModuleMeta>,

    /// Provider descriptors.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Market-data failover chain.
    pub market: MarketConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Optional JSON array of credential submissions to ingest at startup.
    pub credentials_file: Option<String>,
}

impl AppConfig {
    /// Module name, defaulting to `"gx"`.
    pub fn module_name(&self) -> String {
        self.gateway.as_ref().and_then(|m| m.module_name.clone()).unwrap_or_else(|| "gx".into())
    }

    pub fn log_path(&self) -> Option<String> {
        self.gateway.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Build every provider descriptor, failing on the first bad entry or on
    /// duplicate names.
    pub fn descriptors(&self) -> Result<Vec<ProviderDescriptor>> {
        let mut seen = HashSet::new();
        self.providers
            .iter()
            .map(|p| {
                if !seen.insert(p.name.to_lowercase()) {
                    return Err(GxError::Config(format!("duplicate provider name: {}", p.name)));
                }
                p.to_descriptor()
            })
            .collect()
    }

    /// Structural validation performed once at startup.
    pub fn validate(&self) -> Result<()> {
        self.descriptors()?;
        if self.market.sources.is_empty() {
            return Err(GxError::Config("market.sources must list at least one provider".into()));
        }
        if self.market.symbols.is_empty() {
            return Err(GxError::Config("market.symbols must not be empty".into()));
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// One provider entry as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,

    /// Convention label (`"binance_hmac"`, `"bybit_v5"`, `"mexc_contract"`).
    pub signing_convention: Option<String>,

    pub rate_limit_hint: Option<u32>,

    /// Defaults to `true` when a signing convention is set.
    pub authenticated: Option<bool>,

    /// Override of the convention's default key/secret rules.
    pub key_format: Option<KeyFormat>,

    /// Per-operation endpoint overrides.
    #[serde(default)]
    pub endpoints: HashMap<String, Endpoint>,

    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,

    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl ProviderConfig {
    /// Resolve into an immutable descriptor.
    pub fn to_descriptor(&self) -> Result<ProviderDescriptor> {
        if self.name.trim().is_empty() {
            return Err(GxError::Config("provider name must not be empty".into()));
        }
        let convention = self
            .signing_convention
            .as_deref()
            .map(str::parse::<SigningConvention>)
            .transpose()?;
        let authenticated = self.authenticated.unwrap_or(convention.is_some());
        if authenticated && convention.is_none() {
            return Err(GxError::Config(format!(
                "provider '{}' is authenticated but has no signing_convention",
                self.name
            )));
        }
        if let Some(fmt) = &self.key_format {
            if fmt.key_min > fmt.key_max || fmt.secret_min > fmt.secret_max {
                return Err(GxError::Config(format!("provider '{}' has an empty key_format range", self.name)));
            }
        }
        if self.timeout_ms == 0 {
            return Err(GxError::Config(format!("provider '{}' timeout_ms must be > 0", self.name)));
        }

        Ok(ProviderDescriptor {
            name: self.name.to_lowercase(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            signing_convention: convention,
            rate_limit_hint: self.rate_limit_hint,
            authenticated,
            key_format: self.key_format.clone(),
            endpoints: self.endpoints.clone(),
            recv_window_ms: self.recv_window_ms,
            timeout_ms: self.timeout_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Market Aggregator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Providers in priority order.
    pub sources: Vec<MarketSourceConfig>,

    /// Tracked assets.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Asset used by the degraded estimator.
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: String,

    /// Source queried for the reference asset. Defaults to every entry of
    /// `sources`, tried in order with a single-symbol request.
    #[serde(default)]
    pub reference_source: Option<MarketSourceConfig>,

    /// Timeout for one provider attempt.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,

    /// TTL for cached non-degraded results (0 disables caching).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_ms: u64,
}

/// One entry of the failover chain.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSourceConfig {
    /// `"binance"`, `"bybit"` or `"coingecko"`.
    pub kind: String,
    /// Override of the provider's public base URL.
    pub base_url: Option<String>,
    /// Display name, defaulting to `kind`.
    pub name: Option<String>,
}

impl MarketSourceConfig {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Supervisor and built-in manager timings.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_pulse_interval")]
    pub pulse_interval_ms: u64,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_revalidation_interval")]
    pub revalidation_interval_ms: u64,
    #[serde(default = "default_status_interval")]
    pub status_interval_ms: u64,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace(),
            pulse_interval_ms: default_pulse_interval(),
            snapshot_interval_ms: default_snapshot_interval(),
            revalidation_interval_ms: default_revalidation_interval(),
            status_interval_ms: default_status_interval(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_recv_window() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    10_000
}

fn default_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"].iter().map(|s| s.to_string()).collect()
}

fn default_reference_symbol() -> String {
    "BTCUSDT".into()
}

fn default_attempt_timeout() -> u64 {
    5000
}

fn default_cache_ttl() -> u64 {
    15_000
}

fn default_stop_grace() -> u64 {
    5000
}

fn default_pulse_interval() -> u64 {
    60_000
}

fn default_snapshot_interval() -> u64 {
    300_000
}

fn default_revalidation_interval() -> u64 {
    600_000
}

fn default_status_interval() -> u64 {
    60_000
}

fn default_bus_capacity() -> usize {
    crate::bus::DEFAULT_BUS_CAPACITY
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load a JSON array of credential submissions.
pub fn load_credentials(path: &Path) -> anyhow::Result<Vec<CredentialSubmission>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
