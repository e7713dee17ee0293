//! Zero Rebalance - one regime-aware rebalance decision pass.
//!
//! Usage: `zero-rebalance [SNAPSHOT.json]`. The snapshot path may also come
//! from `ZERO_REBALANCE_SNAPSHOT`.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use zero_common::config::Config;
use zero_common::config_loader::check_modular_files;
use zero_common::logging::init_logging_with_exclusions;
use zero_rebalance::data::{SnapshotProvider, WeekdayCalendar};
use zero_rebalance::{RebalanceSession, RegimeRebalanceConfig, RegimeRebalanceEngine, StateStore};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Zero Rebalance v{}", env!("CARGO_PKG_VERSION"));
    for (file, present) in check_modular_files(None) {
        tracing::debug!(file = %file, present, "Config file");
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let settings = RegimeRebalanceConfig::from_config(&config)?;
    if !settings.enabled {
        tracing::info!("Regime rebalancing is disabled, nothing to do");
        return Ok(());
    }

    let snapshot_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ZERO_REBALANCE_SNAPSHOT").ok())
        .map(PathBuf::from)
        .context("Usage: zero-rebalance <SNAPSHOT.json> (or set ZERO_REBALANCE_SNAPSHOT)")?;
    let snapshot = Arc::new(SnapshotProvider::load(&snapshot_path).await?);

    let calendar =
        WeekdayCalendar::us_equities().with_holidays(snapshot.holidays().iter().copied());
    let store = if config.database.enabled {
        Some(StateStore::open(config.database.resolved_path())?)
    } else {
        None
    };

    let engine = RegimeRebalanceEngine::from_config(&config, snapshot.clone(), Arc::new(calendar))?;
    let session = RebalanceSession::new(engine, snapshot.clone(), store);

    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        "Service initialized"
    );

    let outcome = session.run_once(snapshot.account(), Utc::now()).await?;

    println!("{}", outcome.rationale);
    println!("{}", serde_json::to_string_pretty(&outcome.decision.orders)?);
    Ok(())
}
