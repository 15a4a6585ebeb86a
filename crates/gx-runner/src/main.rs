//! # gx-runner
//!
//! Main entry point for the authenticated gateway.
//!
//! Loads a JSON configuration file, wires the provider clients, credential
//! store and market aggregator, ingests the configured credentials and runs
//! the built-in managers until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! gx-runner config.json --log-level info
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use gx_core::bus::EventBus;
use gx_core::config::AppConfig;
use gx_core::store::CredentialStore;
use gx_core::transport::{HttpTransport, ReqwestTransport};
use gx_supervisor::{AccountSnapshotManager, MarketPulseManager, RevalidationManager, Supervisor};
use gx_td::{CredentialGateway, KeyValidator, ProviderClients, Signer};
use tracing::{error, info, warn};

/// Authenticated multi-provider gateway.
#[derive(Parser)]
#[command(name = "gx-runner", about = "Authenticated multi-provider gateway")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `gateway.log_path`.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Configuration, then logging (the log path may come from the file)
    let config = gx_core::config::load_config(&cli.config)?;
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    let _log_guard = gx_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());

    info!("[runner] starting, config={}, log_level={}", cli.config.display(), cli.log_level);

    // 2. Provider clients and credential plumbing
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
    let signer = Arc::new(Signer::with_builtin());
    let clients = Arc::new(ProviderClients::from_descriptors(config.descriptors()?, signer, Arc::clone(&transport))?);
    info!("[runner] {} provider(s): {}", clients.len(), clients.names().join(", "));

    let bus = EventBus::new(config.supervisor.bus_capacity);
    let store = Arc::new(CredentialStore::new());
    let validator = Arc::new(KeyValidator::new(Arc::clone(&store), Arc::clone(&clients)));
    let gateway = CredentialGateway::new(Arc::clone(&validator)).with_bus(bus.clone());

    // 3. Market aggregator
    let aggregator = Arc::new(gx_md::build_aggregator(&config.market, Arc::clone(&transport))?);

    // 4. Credentials handed over by provisioning
    if let Some(path) = &config.credentials_file {
        ingest_credentials(&gateway, Path::new(path)).await;
    }

    // 5. Supervisor
    let supervisor = build_supervisor(&config, bus, aggregator, store, clients, validator);
    supervisor.start();
    info!("[runner] {} task(s) running, press Ctrl+C to stop", supervisor.status().len());

    let mut status_tick = tokio::time::interval(Duration::from_millis(config.supervisor.status_interval_ms.max(1)));
    status_tick.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("[runner] signal handler failed: {e}");
                }
                break;
            }
            _ = status_tick.tick() => log_status(&supervisor),
        }
    }

    info!("[runner] shutdown signal received");
    supervisor.stop_all().await;
    log_status(&supervisor);
    info!("[runner] stopped");
    Ok(())
}

fn build_supervisor(
    config: &AppConfig,
    bus: EventBus,
    aggregator: Arc<gx_md::MarketAggregator>,
    store: Arc<CredentialStore>,
    clients: Arc<ProviderClients>,
    validator: Arc<KeyValidator>,
) -> Supervisor {
    let timings = &config.supervisor;
    let ms = Duration::from_millis;
    let supervisor = Supervisor::new(bus, ms(timings.stop_grace_ms));
    supervisor.register(Arc::new(MarketPulseManager::new(aggregator, ms(timings.pulse_interval_ms))));
    supervisor.register(Arc::new(
        AccountSnapshotManager::new(store, clients, ms(timings.snapshot_interval_ms)).with_validator(Arc::clone(&validator)),
    ));
    supervisor.register(Arc::new(RevalidationManager::new(validator, ms(timings.revalidation_interval_ms))));
    supervisor
}

async fn ingest_credentials(gateway: &CredentialGateway, path: &Path) {
    let submissions = match gx_core::config::load_credentials(path) {
        Ok(s) => s,
        Err(e) => {
            error!("[runner] cannot read credentials from {}: {e:#}", path.display());
            return;
        }
    };
    let total = submissions.len();
    let mut valid = 0usize;
    for submission in submissions {
        let key = submission.key();
        let result = gateway.add_credential(submission).await;
        if result.is_valid() {
            valid += 1;
        } else {
            warn!("[runner] credential {key}: {result}");
        }
    }
    info!("[runner] ingested {total} credential(s), {valid} valid");
}

fn log_status(supervisor: &Supervisor) {
    for s in supervisor.status() {
        let since = s.since_last_run.map(|d| format!("{}s ago", d.as_secs())).unwrap_or_else(|| "never".into());
        match &s.last_error {
            Some(err) => warn!(
                "[status] {} state={} runs={} failures={} last_run={since} last_error={err}",
                s.name, s.state, s.runs, s.failures
            ),
            None => info!("[status] {} state={} runs={} last_run={since}", s.name, s.state, s.runs),
        }
    }
}
