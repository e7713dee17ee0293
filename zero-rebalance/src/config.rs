//! Typed rebalance configuration.
//!
//! [`RegimeRebalanceConfig`] resolves the raw `rebalance` section of
//! [`zero_common::config::Config`] into defaulted values, and
//! [`resolve_policies`] turns the symbol table into one fully-resolved
//! [`SymbolPolicy`] per basket symbol. Both are computed once per invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use zero_common::config::{Config, SymbolConfig};
use zero_common::validation::{collect_errors, Validate, ValidationError, ValidationResult};

use crate::error::{RebalanceError, Result};

/// Order reference prefix tagging rebalance orders.
pub const DEFAULT_ORDER_REF_PREFIX: &str = "tg:regime-rebalance";

// ============================================================================
// Weight Base
// ============================================================================

/// Which account value the target weights apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightBase {
    /// Net liquidation value times margin usage
    NetLiq,
    /// Sum of current basket position values
    ManagedStocks,
    /// Net liquidation value minus option value, times margin usage
    #[default]
    NetLiqExOptions,
}

impl WeightBase {
    /// Parse from config string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "net_liq" => Some(Self::NetLiq),
            "managed_stocks" => Some(Self::ManagedStocks),
            "net_liq_ex_options" => Some(Self::NetLiqExOptions),
            _ => None,
        }
    }
}

impl fmt::Display for WeightBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetLiq => write!(f, "net_liq"),
            Self::ManagedStocks => write!(f, "managed_stocks"),
            Self::NetLiqExOptions => write!(f, "net_liq_ex_options"),
        }
    }
}

// ============================================================================
// Ratio Gate
// ============================================================================

/// Anchor-vs-basket ratio drift check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioGateConfig {
    /// Block trading on failure; when false the gate runs in shadow mode
    pub enabled: bool,
    /// Anchor symbol
    pub anchor: String,
    /// Maximum drift t-statistic
    pub drift_max: f64,
    /// Minimum variance of log-ratio differences
    pub var_min: f64,
}

impl Default for RatioGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            anchor: String::new(),
            drift_max: 1.25,
            var_min: 0.0,
        }
    }
}

// ============================================================================
// Regime Rebalance
// ============================================================================

/// Resolved regime rebalance settings.
///
/// Rail thresholds (`flow_*`, `deficit_*`) are fractions of the rebalance
/// base value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRebalanceConfig {
    pub enabled: bool,
    /// Basket symbols in config order
    pub symbols: Vec<String>,
    /// Regime window length in bars
    pub lookback_days: usize,
    pub soft_band: f64,
    pub hard_band: f64,
    /// Fraction of the hard-band gap traded per pass
    pub hard_band_rebalance_fraction: f64,
    /// Trading sessions required between rebalances
    pub cooldown_days: i64,
    pub choppiness_min: f64,
    pub efficiency_max: f64,
    pub flow_trade_min: f64,
    pub flow_trade_stop: f64,
    /// Net gap share required before flow trades are placed
    pub flow_imbalance_tau: f64,
    pub deficit_rail_start: f64,
    pub deficit_rail_stop: f64,
    /// Numerical floor
    pub eps: f64,
    /// Execution history window for the cooldown gate
    pub order_history_lookback_days: u32,
    pub order_ref_prefix: String,
    pub weight_base: WeightBase,
    /// Buying power multiplier on net liquidation value
    pub margin_usage: f64,
    /// Calendar used for cooldown session counting
    pub exchange: String,
    pub ratio_gate: Option<RatioGateConfig>,
}

impl Default for RegimeRebalanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            symbols: Vec::new(),
            lookback_days: 40,
            soft_band: 0.10,
            hard_band: 0.50,
            hard_band_rebalance_fraction: 1.0,
            cooldown_days: 5,
            choppiness_min: 3.0,
            efficiency_max: 0.30,
            flow_trade_min: 0.025,
            flow_trade_stop: 0.0125,
            flow_imbalance_tau: 0.70,
            deficit_rail_start: 0.06,
            deficit_rail_stop: 0.03,
            eps: 1e-8,
            order_history_lookback_days: 30,
            order_ref_prefix: DEFAULT_ORDER_REF_PREFIX.to_string(),
            weight_base: WeightBase::default(),
            margin_usage: 1.0,
            exchange: "XNYS".to_string(),
            ratio_gate: None,
        }
    }
}

impl RegimeRebalanceConfig {
    /// Resolve from the global configuration, applying defaults.
    ///
    /// Unknown `weight_base` strings are rejected rather than defaulted.
    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();
        let Some(raw) = config.rebalance.as_ref() else {
            return Ok(Self {
                margin_usage: config.account.margin_usage,
                exchange: config.exchange_hours.exchange.clone(),
                ..defaults
            });
        };

        let weight_base = match raw.weight_base.as_deref() {
            Some(s) => WeightBase::parse(s).ok_or_else(|| {
                RebalanceError::ConfigInvariant(format!("unknown weight_base: {s}"))
            })?,
            None => defaults.weight_base,
        };

        let ratio_gate = raw.ratio_gate.as_ref().map(|g| {
            let d = RatioGateConfig::default();
            RatioGateConfig {
                enabled: g.enabled.unwrap_or(d.enabled),
                anchor: g.anchor.clone().unwrap_or(d.anchor),
                drift_max: g.drift_max.unwrap_or(d.drift_max),
                var_min: g.var_min.unwrap_or(d.var_min),
            }
        });

        Ok(Self {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            symbols: raw.symbols.clone().unwrap_or_default(),
            lookback_days: raw.lookback_days.unwrap_or(defaults.lookback_days),
            soft_band: raw.soft_band.unwrap_or(defaults.soft_band),
            hard_band: raw.hard_band.unwrap_or(defaults.hard_band),
            hard_band_rebalance_fraction: raw
                .hard_band_rebalance_fraction
                .unwrap_or(defaults.hard_band_rebalance_fraction),
            cooldown_days: raw.cooldown_days.unwrap_or(defaults.cooldown_days),
            choppiness_min: raw.choppiness_min.unwrap_or(defaults.choppiness_min),
            efficiency_max: raw.efficiency_max.unwrap_or(defaults.efficiency_max),
            flow_trade_min: raw.flow_trade_min.unwrap_or(defaults.flow_trade_min),
            flow_trade_stop: raw.flow_trade_stop.unwrap_or(defaults.flow_trade_stop),
            flow_imbalance_tau: raw.flow_imbalance_tau.unwrap_or(defaults.flow_imbalance_tau),
            deficit_rail_start: raw.deficit_rail_start.unwrap_or(defaults.deficit_rail_start),
            deficit_rail_stop: raw.deficit_rail_stop.unwrap_or(defaults.deficit_rail_stop),
            eps: raw.eps.unwrap_or(defaults.eps),
            order_history_lookback_days: raw
                .order_history_lookback_days
                .unwrap_or(defaults.order_history_lookback_days),
            order_ref_prefix: raw
                .order_ref_prefix
                .clone()
                .unwrap_or(defaults.order_ref_prefix),
            weight_base,
            margin_usage: raw.margin_usage.unwrap_or(config.account.margin_usage),
            exchange: config.exchange_hours.exchange.clone(),
            ratio_gate,
        })
    }
}

impl Validate for RegimeRebalanceConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.enabled && self.symbols.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "rebalance.symbols".into(),
            });
        }
        if self.lookback_days < 1 {
            errors.push(ValidationError::invalid("rebalance.lookback_days", "must be >= 1"));
        }

        let unit_interval = [
            ("soft_band", self.soft_band),
            ("hard_band", self.hard_band),
            ("efficiency_max", self.efficiency_max),
            ("flow_trade_min", self.flow_trade_min),
            ("flow_trade_stop", self.flow_trade_stop),
            ("deficit_rail_start", self.deficit_rail_start),
            ("deficit_rail_stop", self.deficit_rail_stop),
        ];
        for (field, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ValidationError::invalid(
                    format!("rebalance.{field}"),
                    "must be in [0, 1]",
                ));
            }
        }
        if !(self.choppiness_min.is_finite() && self.choppiness_min >= 0.0) {
            errors.push(ValidationError::invalid(
                "rebalance.choppiness_min",
                "must be a non-negative number",
            ));
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            errors.push(ValidationError::invalid(
                "rebalance.eps",
                "must be a positive number",
            ));
        }

        if self.hard_band < self.soft_band {
            errors.push(ValidationError::invalid(
                "rebalance.hard_band",
                "hard_band must be >= soft_band",
            ));
        }
        if self.flow_trade_min < self.flow_trade_stop {
            errors.push(ValidationError::invalid(
                "rebalance.flow_trade_min",
                "flow_trade_min must be >= flow_trade_stop",
            ));
        }
        if self.deficit_rail_start < self.deficit_rail_stop {
            errors.push(ValidationError::invalid(
                "rebalance.deficit_rail_start",
                "deficit_rail_start must be >= deficit_rail_stop",
            ));
        }
        if !(self.hard_band_rebalance_fraction > 0.0 && self.hard_band_rebalance_fraction <= 1.0) {
            errors.push(ValidationError::invalid(
                "rebalance.hard_band_rebalance_fraction",
                "must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.flow_imbalance_tau) {
            errors.push(ValidationError::invalid(
                "rebalance.flow_imbalance_tau",
                "must be in [0, 1]",
            ));
        }
        if !(self.margin_usage.is_finite() && self.margin_usage > 0.0) {
            errors.push(ValidationError::invalid(
                "rebalance.margin_usage",
                "must be a positive number",
            ));
        }

        if let Some(gate) = &self.ratio_gate {
            let anchor = gate.anchor.trim();
            if anchor.is_empty() {
                errors.push(ValidationError::invalid(
                    "rebalance.ratio_gate.anchor",
                    "ratio_gate.anchor must be set",
                ));
            } else if !self.symbols.iter().any(|s| s == anchor) {
                errors.push(ValidationError::invalid(
                    "rebalance.ratio_gate.anchor",
                    "ratio_gate.anchor must be in regime_rebalance.symbols",
                ));
            } else if self.symbols.iter().all(|s| s == anchor) {
                errors.push(ValidationError::invalid(
                    "rebalance.ratio_gate.anchor",
                    "ratio_gate.anchor must leave at least one non-anchor symbol",
                ));
            }
            if !(gate.drift_max.is_finite() && gate.drift_max >= 0.0) {
                errors.push(ValidationError::invalid(
                    "rebalance.ratio_gate.drift_max",
                    "must be a non-negative number",
                ));
            }
        }

        collect_errors(errors)
    }
}

// ============================================================================
// Symbol Policy
// ============================================================================

/// Sides a symbol may trade on when rebalancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
    #[default]
    Both,
}

impl TradeDirection {
    pub fn allows_buy(&self) -> bool {
        matches!(self, Self::Buy | Self::Both)
    }

    pub fn allows_sell(&self) -> bool {
        matches!(self, Self::Sell | Self::Both)
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Fully-resolved per-symbol trading policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolPolicy {
    pub symbol: String,
    /// Target weight (> 0)
    pub weight: f64,
    /// Routing exchange for orders
    pub exchange: String,
    /// False when `no_trading` is set
    pub trading_allowed: bool,
    pub direction: TradeDirection,
    /// Minimum shares per trade
    pub min_shares: u32,
    /// Minimum dollar amount per trade
    pub min_amount: Option<f64>,
    /// Minimum trade as a fraction of net liquidation value
    pub min_percent: Option<f64>,
    /// Minimum gap to target as a fraction of target value
    pub min_percent_relative: Option<f64>,
}

impl SymbolPolicy {
    fn resolve(symbol: &str, cfg: &SymbolConfig) -> Self {
        let overrides = cfg.rebalance.clone().unwrap_or_default();

        let direction = match overrides.mode.as_deref().map(str::to_lowercase).as_deref() {
            Some("buy") => TradeDirection::Buy,
            Some("sell") => TradeDirection::Sell,
            Some(_) => TradeDirection::Both,
            None if cfg.buy_only_rebalancing == Some(true) => TradeDirection::Buy,
            None if cfg.sell_only_rebalancing == Some(true) => TradeDirection::Sell,
            None => TradeDirection::Both,
        };

        Self {
            symbol: symbol.to_string(),
            weight: cfg.weight,
            exchange: cfg
                .primary_exchange
                .clone()
                .unwrap_or_else(|| "SMART".to_string()),
            trading_allowed: !cfg.no_trading.unwrap_or(false),
            direction,
            min_shares: overrides
                .min_threshold_shares
                .or(cfg.buy_only_min_threshold_shares)
                .or(cfg.sell_only_min_threshold_shares)
                .unwrap_or(1),
            min_amount: overrides
                .min_threshold_amount
                .or(cfg.buy_only_min_threshold_amount)
                .or(cfg.sell_only_min_threshold_amount),
            min_percent: overrides
                .min_threshold_percent
                .or(cfg.buy_only_min_threshold_percent)
                .or(cfg.sell_only_min_threshold_percent),
            min_percent_relative: overrides
                .min_threshold_percent_relative
                .or(cfg.buy_only_min_threshold_percent_relative)
                .or(cfg.sell_only_min_threshold_percent_relative),
        }
    }
}

/// Resolve the basket into positive-weight symbol policies, in basket order.
///
/// Zero-weight symbols are dropped with a warning. Fails when a basket symbol
/// is missing from the symbol table or no symbol carries a positive weight.
pub fn resolve_policies(config: &Config, basket: &[String]) -> Result<Vec<SymbolPolicy>> {
    let mut policies = Vec::with_capacity(basket.len());

    for symbol in basket {
        let cfg = config.symbols.get(symbol).ok_or_else(|| {
            RebalanceError::ConfigInvariant(format!("basket symbol {symbol} is not configured"))
        })?;

        if !(cfg.weight.is_finite() && cfg.weight > 0.0) {
            tracing::warn!(
                symbol = %symbol,
                weight = cfg.weight,
                "Ignoring basket symbol without positive weight"
            );
            continue;
        }
        policies.push(SymbolPolicy::resolve(symbol, cfg));
    }

    if policies.is_empty() {
        return Err(RebalanceError::ConfigInvariant(
            "regime rebalance requires positive target weights".to_string(),
        ));
    }

    Ok(policies)
}
