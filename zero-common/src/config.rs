//! Configuration types for the Zero rebalancer.
//!
//! The configuration lives in `~/.zero-rebalance/` as JSON. `config.json`
//! carries the core sections; `rebalance.json` and `symbols.json` may split
//! the basket definition out into their own files (see [`crate::config_loader`]).
//!
//! Sections that belong to the rebalance service are kept as raw optional
//! values here and resolved into typed, defaulted structs by the service crate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;

/// Name of the per-user configuration directory.
const CONFIG_DIR_NAME: &str = ".zero-rebalance";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(CONFIG_DIR_NAME),
        |dirs| dirs.home_dir().join(CONFIG_DIR_NAME),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Additional targets clamped to `warn`
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Database
// ============================================================================

/// Durable state store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Persist decisions and hysteresis state
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SQLite file path; `~` and environment variables are expanded
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Resolve the configured path, expanding `~` and `$VARS`.
    pub fn resolved_path(&self) -> PathBuf {
        match shellexpand::full(&self.path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "Failed to expand database path");
                PathBuf::from(&self.path)
            }
        }
    }
}

// ============================================================================
// Account
// ============================================================================

/// Account-wide sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Fraction of net liquidation value treated as buying power
    #[serde(default = "default_margin_usage")]
    pub margin_usage: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            margin_usage: default_margin_usage(),
        }
    }
}

/// Exchange calendar used for session counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeHoursConfig {
    /// Exchange calendar code (ISO 10383 MIC, e.g. "XNYS")
    #[serde(default = "default_exchange")]
    pub exchange: String,
}

impl Default for ExchangeHoursConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
        }
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Per-symbol rebalance overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolRebalanceOverride {
    /// Trade direction restriction: "buy", "sell" or "both"
    #[serde(default)]
    pub mode: Option<String>,
    /// Minimum share count per trade
    #[serde(default)]
    pub min_threshold_shares: Option<u32>,
    /// Minimum dollar amount per trade
    #[serde(default)]
    pub min_threshold_amount: Option<f64>,
    /// Minimum trade size as a fraction of net liquidation value
    #[serde(default)]
    pub min_threshold_percent: Option<f64>,
    /// Minimum gap to target as a fraction of the target value
    #[serde(default)]
    pub min_threshold_percent_relative: Option<f64>,
}

/// Symbol configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Target weight (0-1)
    #[serde(default)]
    pub weight: f64,
    /// Primary listing exchange used for order routing
    #[serde(default)]
    pub primary_exchange: Option<String>,
    /// Never trade this symbol
    #[serde(default)]
    pub no_trading: Option<bool>,
    /// Legacy flag: only buy when rebalancing
    #[serde(default)]
    pub buy_only_rebalancing: Option<bool>,
    /// Legacy flag: only sell when rebalancing
    #[serde(default)]
    pub sell_only_rebalancing: Option<bool>,
    /// Buy-only minimum share count
    #[serde(default)]
    pub buy_only_min_threshold_shares: Option<u32>,
    /// Buy-only minimum dollar amount
    #[serde(default)]
    pub buy_only_min_threshold_amount: Option<f64>,
    /// Buy-only minimum percent of net liquidation value
    #[serde(default)]
    pub buy_only_min_threshold_percent: Option<f64>,
    /// Buy-only minimum gap to target as a fraction of the target value
    #[serde(default)]
    pub buy_only_min_threshold_percent_relative: Option<f64>,
    /// Sell-only minimum share count
    #[serde(default)]
    pub sell_only_min_threshold_shares: Option<u32>,
    /// Sell-only minimum dollar amount
    #[serde(default)]
    pub sell_only_min_threshold_amount: Option<f64>,
    /// Sell-only minimum percent of net liquidation value
    #[serde(default)]
    pub sell_only_min_threshold_percent: Option<f64>,
    /// Sell-only minimum gap to target as a fraction of the target value
    #[serde(default)]
    pub sell_only_min_threshold_percent_relative: Option<f64>,
    /// Rebalance-specific overrides
    #[serde(default)]
    pub rebalance: Option<SymbolRebalanceOverride>,
}

// ============================================================================
// Regime Rebalance
// ============================================================================

/// Ratio gate settings as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatioGateSection {
    /// Block trading when the gate fails (otherwise shadow mode)
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Anchor symbol compared against the rest of the basket
    #[serde(default)]
    pub anchor: Option<String>,
    /// Maximum allowed drift t-statistic
    #[serde(default)]
    pub drift_max: Option<f64>,
    /// Minimum variance of the log-ratio differences
    #[serde(default)]
    pub var_min: Option<f64>,
}

/// Regime rebalance settings as written in the config file.
///
/// Every field is optional; the service applies its own defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebalanceConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Basket symbols (must exist in `symbols`)
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub lookback_days: Option<usize>,
    #[serde(default)]
    pub soft_band: Option<f64>,
    #[serde(default)]
    pub hard_band: Option<f64>,
    #[serde(default)]
    pub hard_band_rebalance_fraction: Option<f64>,
    #[serde(default)]
    pub cooldown_days: Option<i64>,
    #[serde(default)]
    pub choppiness_min: Option<f64>,
    #[serde(default)]
    pub efficiency_max: Option<f64>,
    #[serde(default)]
    pub flow_trade_min: Option<f64>,
    #[serde(default)]
    pub flow_trade_stop: Option<f64>,
    #[serde(default)]
    pub flow_imbalance_tau: Option<f64>,
    #[serde(default)]
    pub deficit_rail_start: Option<f64>,
    #[serde(default)]
    pub deficit_rail_stop: Option<f64>,
    #[serde(default)]
    pub eps: Option<f64>,
    #[serde(default)]
    pub order_history_lookback_days: Option<u32>,
    /// Order reference prefix tagging rebalance fills
    #[serde(default)]
    pub order_ref_prefix: Option<String>,
    /// "net_liq", "managed_stocks" or "net_liq_ex_options"
    #[serde(default)]
    pub weight_base: Option<String>,
    /// Overrides `account.margin_usage` for the rebalance base
    #[serde(default)]
    pub margin_usage: Option<f64>,
    #[serde(default)]
    pub ratio_gate: Option<RatioGateSection>,
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// JSON schema reference (ignored)
    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub exchange_hours: ExchangeHoursConfig,
    /// Symbol table keyed by ticker
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolConfig>,
    /// Regime rebalance section
    #[serde(default)]
    pub rebalance: Option<RebalanceConfig>,
}

impl Config {
    /// Load configuration from the default directory, merging modular files.
    pub fn load() -> Result<Self> {
        Self::load_dir(&config_dir())
    }

    /// Load configuration from a directory containing `config.json` and
    /// optional modular files.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(Some(dir.to_path_buf()))?;
        if value.as_object().map_or(true, |o| o.is_empty()) {
            tracing::info!(dir = %dir.display(), "Config file not found, using defaults");
        }

        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("ZERO_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("ZERO_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(path) = lookup("ZERO_REBALANCE_DB_PATH") {
            self.database.path = path;
        }
        if let Some(enabled) = lookup("ZERO_REBALANCE_ENABLED") {
            if let Ok(enabled) = enabled.parse::<bool>() {
                self.rebalance.get_or_insert_with(Default::default).enabled = Some(enabled);
            }
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}
fn default_db_path() -> String {
    format!("~/{CONFIG_DIR_NAME}/state.db")
}
fn default_margin_usage() -> f64 {
    1.0
}
fn default_exchange() -> String {
    "XNYS".into()
}
