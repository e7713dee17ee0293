//! Regime-aware rebalance engine.
//!
//! [`RegimeRebalanceEngine::decide`] fetches history and live prices
//! concurrently, then hands everything to [`RegimeRebalanceEngine::evaluate`],
//! which is synchronous and deterministic: the same account, market inputs,
//! last fill, prior state and clock always produce the same decision.
//!
//! Mode precedence: hard band > soft band (regime, cooldown and ratio gates
//! must all pass) > deficit rail > flow rail > no trade.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zero_common::config::Config;
use zero_common::validation::Validate;

use crate::config::{resolve_policies, RegimeRebalanceConfig, SymbolPolicy, WeightBase};
use crate::data::{AccountSnapshot, MarketDataProvider, TradingCalendar};
use crate::error::{RebalanceError, Result};
use crate::gates::{
    evaluate_bands, evaluate_cooldown, evaluate_rails, relative_drift, Band, CooldownOutcome,
    HysteresisState, RailThresholds,
};
use crate::portfolio::{
    filter_trade, merge_deltas, Holding, ShareAllocator, ShareDeltas, TradeAction, TradeContext,
};
use crate::regime::{
    build_proxy_series, classify_regime, evaluate_ratio_gate, fetch_aligned_history,
    AlignedHistory, RatioGateMetrics, RegimeMetrics,
};

// ============================================================================
// Decision Types
// ============================================================================

/// Trading mode chosen for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RebalanceMode {
    #[serde(rename = "no")]
    Idle,
    #[serde(rename = "hard")]
    Hard,
    #[serde(rename = "soft")]
    Soft,
    /// Hard band pass followed by a deficit cleanup
    #[serde(rename = "hard+deficit")]
    HardDeficit,
    /// Soft band pass followed by a deficit cleanup
    #[serde(rename = "soft+deficit")]
    SoftDeficit,
    #[serde(rename = "deficit")]
    Deficit,
    #[serde(rename = "flow")]
    Flow,
}

impl RebalanceMode {
    /// Whether this is a band rebalance, with or without cleanup.
    pub fn is_band(&self) -> bool {
        matches!(
            self,
            Self::Hard | Self::Soft | Self::HardDeficit | Self::SoftDeficit
        )
    }

    fn with_deficit(self) -> Self {
        match self {
            Self::Hard => Self::HardDeficit,
            Self::Soft => Self::SoftDeficit,
            other => other,
        }
    }
}

impl fmt::Display for RebalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "no",
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::HardDeficit => "hard+deficit",
            Self::SoftDeficit => "soft+deficit",
            Self::Deficit => "deficit",
            Self::Flow => "flow",
        };
        write!(f, "{s}")
    }
}

/// Gate outcomes for one invocation. Recomputed every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub regime_ok: bool,
    pub band: Band,
    pub cooldown_ok: bool,
    /// `None` when no ratio gate is configured
    pub ratio_ok: Option<bool>,
    pub flow_gate: bool,
    pub deficit_gate: bool,
}

/// Signed share order. Positive buys, negative sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceOrder {
    pub symbol: String,
    pub exchange: String,
    pub shares: i64,
}

impl RebalanceOrder {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>, shares: i64) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            shares,
        }
    }
}

/// Per-symbol book and outcome, one row of the rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDecision {
    pub symbol: String,
    pub market_price: f64,
    pub current_weight: f64,
    pub target_weight: f64,
    pub current_value: f64,
    pub target_value: f64,
    pub current_shares: i64,
    pub target_shares: i64,
    /// Allocated shares before the threshold filter
    pub proposed_shares: i64,
    /// Shares actually ordered
    pub shares_to_trade: i64,
    pub trading_allowed: bool,
    pub action: TradeAction,
}

/// Numeric diagnostics behind the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub weight_base: WeightBase,
    /// Rebalance base value
    pub total_value: f64,
    pub invested_value: f64,
    /// `total_value - invested_value`
    pub excess_cash: f64,
    pub max_drift: f64,
    pub soft_breach: bool,
    pub hard_breach: bool,
    /// Regime over the invested-value proxy; drives the soft gate
    pub regime: RegimeMetrics,
    /// Regime over the target-weight proxy
    pub target_regime: RegimeMetrics,
    pub cooldown: CooldownOutcome,
    pub last_fill: Option<DateTime<Utc>>,
    pub rails: RailThresholds,
    pub ratio_gate: Option<RatioGateMetrics>,
    /// Last aligned history date
    pub history_end: Option<NaiveDate>,
}

/// Output of one decision pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceDecision {
    pub mode: RebalanceMode,
    pub verdict: GateVerdict,
    pub orders: Vec<RebalanceOrder>,
    pub symbols: Vec<SymbolDecision>,
    pub diagnostics: Diagnostics,
    pub prior_state: HysteresisState,
    /// State to persist for the next invocation
    pub next_state: HysteresisState,
}

/// Market inputs gathered by [`RegimeRebalanceEngine::fetch_market`].
#[derive(Debug, Clone)]
pub struct MarketInputs {
    pub history: AlignedHistory,
    /// Validated live prices keyed by symbol
    pub prices: BTreeMap<String, f64>,
}

fn check_price(symbol: &str, price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(RebalanceError::invalid_price(
            symbol,
            format!("invalid live price {price}"),
        ))
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Decision engine for one symbol basket.
pub struct RegimeRebalanceEngine {
    config: RegimeRebalanceConfig,
    policies: Vec<SymbolPolicy>,
    market: Arc<dyn MarketDataProvider>,
    calendar: Arc<dyn TradingCalendar>,
}

impl RegimeRebalanceEngine {
    /// Create an engine from resolved settings and policies.
    pub fn new(
        config: RegimeRebalanceConfig,
        policies: Vec<SymbolPolicy>,
        market: Arc<dyn MarketDataProvider>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Result<Self> {
        config.validate()?;
        if policies.is_empty() {
            return Err(RebalanceError::ConfigInvariant(
                "regime rebalance requires positive target weights".to_string(),
            ));
        }
        Ok(Self {
            config,
            policies,
            market,
            calendar,
        })
    }

    /// Resolve settings and policies from the global configuration.
    pub fn from_config(
        config: &Config,
        market: Arc<dyn MarketDataProvider>,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Result<Self> {
        let settings = RegimeRebalanceConfig::from_config(config)?;
        settings.validate()?;
        let policies = resolve_policies(config, &settings.symbols)?;
        Self::new(settings, policies, market, calendar)
    }

    pub fn config(&self) -> &RegimeRebalanceConfig {
        &self.config
    }

    pub fn policies(&self) -> &[SymbolPolicy] {
        &self.policies
    }

    /// Positive-weight basket symbols.
    pub fn symbols(&self) -> Vec<String> {
        self.policies.iter().map(|p| p.symbol.clone()).collect()
    }

    /// Fetch aligned history and live prices concurrently.
    pub async fn fetch_market(&self) -> Result<MarketInputs> {
        let symbols = self.symbols();

        let prices = try_join_all(symbols.iter().map(|symbol| async move {
            let price = self
                .market
                .fetch_live_price(symbol)
                .await
                .map_err(|source| RebalanceError::Fetch {
                    symbol: symbol.clone(),
                    source,
                })?;
            check_price(symbol, price).map(|p| (symbol.clone(), p))
        }));
        let history = fetch_aligned_history(
            self.market.as_ref(),
            &symbols,
            self.config.lookback_days,
            self.config.cooldown_days,
        );

        let (history, prices) = tokio::try_join!(history, prices)?;
        Ok(MarketInputs {
            history,
            prices: prices.into_iter().collect(),
        })
    }

    /// Fetch market inputs and evaluate.
    pub async fn decide(
        &self,
        account: &AccountSnapshot,
        last_fill: Option<DateTime<Utc>>,
        prior: HysteresisState,
        now: DateTime<Utc>,
    ) -> Result<RebalanceDecision> {
        let market = self.fetch_market().await?;
        self.evaluate(account, &market, last_fill, prior, now)
    }

    fn base_value(&self, account: &AccountSnapshot, managed_value: f64) -> f64 {
        let margin = self.config.margin_usage;
        match self.config.weight_base {
            WeightBase::ManagedStocks => managed_value,
            WeightBase::NetLiq => (account.net_liquidation * margin).floor(),
            WeightBase::NetLiqExOptions => {
                ((account.net_liquidation - account.option_market_value) * margin).floor()
            }
        }
    }

    /// Produce the decision from already-fetched inputs.
    pub fn evaluate(
        &self,
        account: &AccountSnapshot,
        market: &MarketInputs,
        last_fill: Option<DateTime<Utc>>,
        prior: HysteresisState,
        now: DateTime<Utc>,
    ) -> Result<RebalanceDecision> {
        let cfg = &self.config;

        let mut holdings = Vec::with_capacity(self.policies.len());
        for policy in &self.policies {
            let price = market.prices.get(&policy.symbol).copied().ok_or_else(|| {
                RebalanceError::invalid_price(&policy.symbol, "missing live price")
            })?;
            let price = check_price(&policy.symbol, price)?;
            holdings.push(Holding {
                symbol: policy.symbol.clone(),
                price,
                weight: policy.weight,
                current_shares: account.whole_shares(&policy.symbol),
                target_shares: 0,
                trading_allowed: policy.trading_allowed,
            });
        }

        let invested_value: f64 = holdings.iter().map(Holding::current_value).sum();
        let total_value = self.base_value(account, invested_value);
        if !(total_value.is_finite() && total_value > 0.0) {
            return Err(RebalanceError::InvalidAccount(format!(
                "rebalance base value ({}) is not positive: {total_value}",
                cfg.weight_base
            )));
        }

        let mut drifts = Vec::with_capacity(holdings.len());
        for h in &mut holdings {
            let target_value = h.weight * total_value;
            h.target_shares = (target_value / h.price).floor() as i64;
            drifts.push(relative_drift(h.current_value() / total_value, h.weight));
        }

        // Regime
        let target_weights: Vec<(String, f64)> = self
            .policies
            .iter()
            .map(|p| (p.symbol.clone(), p.weight))
            .collect();
        let invested: Vec<(String, f64)> = holdings
            .iter()
            .filter(|h| h.current_value() > 0.0)
            .map(|h| (h.symbol.clone(), h.current_value()))
            .collect();
        let proxy_weights = if invested.is_empty() {
            warn!("Regime proxy has no invested symbols; falling back to target weights");
            target_weights.clone()
        } else {
            invested
        };

        let classify = |weights: &[(String, f64)]| -> Result<RegimeMetrics> {
            let series = build_proxy_series(&market.history, weights)?;
            classify_regime(
                &series,
                cfg.lookback_days,
                cfg.choppiness_min,
                cfg.efficiency_max,
                cfg.eps,
            )
        };
        let regime = classify(proxy_weights.as_slice())?;
        let target_regime = classify(target_weights.as_slice())?;

        let ratio_gate = cfg
            .ratio_gate
            .as_ref()
            .map(|gate| {
                evaluate_ratio_gate(
                    gate,
                    &market.history,
                    &target_weights,
                    cfg.lookback_days,
                    cfg.eps,
                )
            })
            .transpose()?;

        let cooldown = evaluate_cooldown(
            last_fill,
            now,
            cfg.cooldown_days,
            self.calendar.as_ref(),
            &cfg.exchange,
        );

        // Gates
        let bands = evaluate_bands(drifts.iter().copied(), cfg.soft_band, cfg.hard_band, cfg.eps);
        let ratio_permits = ratio_gate.as_ref().map_or(true, RatioGateMetrics::permits_trading);
        let hard_rebalance = bands.hard_breach;
        let soft_rebalance =
            bands.soft_breach && regime.regime_ok && cooldown.ok && ratio_permits;

        let thresholds = RailThresholds::from_fractions(
            total_value,
            cfg.flow_trade_min,
            cfg.flow_trade_stop,
            cfg.deficit_rail_start,
            cfg.deficit_rail_stop,
        );
        let excess_cash = total_value - invested_value;
        let rails = evaluate_rails(excess_cash, &thresholds, prior);

        // Allocation
        let allocator = ShareAllocator::new(&holdings, cfg.flow_imbalance_tau);
        let mut deficit_after_band = false;
        let (mode, proposed) = if hard_rebalance || soft_rebalance {
            let mut mode = if hard_rebalance {
                RebalanceMode::Hard
            } else {
                RebalanceMode::Soft
            };
            let fraction = hard_rebalance.then_some(cfg.hard_band_rebalance_fraction);
            let mut orders = allocator.band_orders(fraction);

            let shares_after = allocator.shares_after(&orders);
            let deficit_after = (allocator.invested_value(&shares_after) - total_value).max(0.0);
            deficit_after_band = deficit_after >= thresholds.deficit_stop;
            if deficit_after_band {
                let needed = (deficit_after - thresholds.deficit_stop).max(0.0);
                let cleanup = allocator.deficit_orders(&shares_after, needed);
                if !cleanup.is_empty() {
                    mode = mode.with_deficit();
                    merge_deltas(&mut orders, cleanup);
                }
            }
            (mode, orders)
        } else if rails.deficit_gate {
            let needed = (-excess_cash - thresholds.deficit_stop).max(0.0);
            let current = allocator.shares_after(&ShareDeltas::new());
            (RebalanceMode::Deficit, allocator.deficit_orders(&current, needed))
        } else if rails.flow_gate {
            (RebalanceMode::Flow, allocator.flow_orders(excess_cash))
        } else {
            (RebalanceMode::Idle, ShareDeltas::new())
        };

        // Threshold filter
        let mut orders = Vec::new();
        let mut symbols = Vec::with_capacity(holdings.len());
        for (policy, h) in self.policies.iter().zip(&holdings) {
            let proposed_shares = proposed.get(&h.symbol).copied().unwrap_or(0);
            let target_value = h.weight * total_value;
            let filtered = filter_trade(
                policy,
                proposed_shares,
                &TradeContext {
                    price: h.price,
                    current_value: h.current_value(),
                    target_value,
                    net_liquidation: account.net_liquidation,
                },
            );
            if filtered.shares != 0 {
                orders.push(RebalanceOrder::new(&h.symbol, &policy.exchange, filtered.shares));
            } else if proposed_shares != 0 {
                debug!(
                    symbol = %h.symbol,
                    proposed = proposed_shares,
                    action = %filtered.action,
                    "Trade filtered"
                );
            }
            symbols.push(SymbolDecision {
                symbol: h.symbol.clone(),
                market_price: h.price,
                current_weight: h.current_value() / total_value,
                target_weight: h.weight,
                current_value: h.current_value(),
                target_value,
                current_shares: h.current_shares,
                target_shares: h.target_shares,
                proposed_shares,
                shares_to_trade: filtered.shares,
                trading_allowed: h.trading_allowed,
                action: filtered.action,
            });
        }

        let next_state = HysteresisState {
            flow_active: mode == RebalanceMode::Flow && rails.flow_gate,
            deficit_active: if hard_rebalance || soft_rebalance {
                deficit_after_band
            } else {
                rails.deficit_gate
            },
        };

        let verdict = GateVerdict {
            regime_ok: regime.regime_ok,
            band: bands.band(),
            cooldown_ok: cooldown.ok,
            ratio_ok: ratio_gate.as_ref().map(|g| g.ratio_ok),
            flow_gate: rails.flow_gate,
            deficit_gate: rails.deficit_gate,
        };

        info!(
            mode = %mode,
            band = %verdict.band,
            max_drift = bands.max_drift,
            choppiness = regime.choppiness,
            efficiency = regime.efficiency,
            regime_ok = regime.regime_ok,
            cooldown_ok = cooldown.ok,
            ratio_ok = ?verdict.ratio_ok,
            flow_gate = rails.flow_gate,
            deficit_gate = rails.deficit_gate,
            excess_cash,
            orders = orders.len(),
            "Regime rebalance decision"
        );

        Ok(RebalanceDecision {
            mode,
            verdict,
            orders,
            symbols,
            diagnostics: Diagnostics {
                weight_base: cfg.weight_base,
                total_value,
                invested_value,
                excess_cash,
                max_drift: bands.max_drift,
                soft_breach: bands.soft_breach,
                hard_breach: bands.hard_breach,
                regime,
                target_regime,
                cooldown,
                last_fill,
                rails: thresholds,
                ratio_gate,
                history_end: market.history.last_date(),
            },
            prior_state: prior,
            next_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeDirection;
    use crate::data::{PricePoint, ProviderError, WeekdayCalendar};
    use crate::regime::align_history;
    use async_trait::async_trait;

    struct NoMarket;

    #[async_trait]
    impl MarketDataProvider for NoMarket {
        fn name(&self) -> &str {
            "none"
        }

        async fn fetch_history(
            &self,
            symbol: &str,
            _: u32,
        ) -> std::result::Result<Vec<PricePoint>, ProviderError> {
            Err(ProviderError::DataNotAvailable(symbol.to_string()))
        }

        async fn fetch_live_price(&self, symbol: &str) -> std::result::Result<f64, ProviderError> {
            Err(ProviderError::DataNotAvailable(symbol.to_string()))
        }
    }

    fn policy(symbol: &str) -> SymbolPolicy {
        SymbolPolicy {
            symbol: symbol.into(),
            weight: 0.5,
            exchange: "NYSE".into(),
            trading_allowed: true,
            direction: TradeDirection::Both,
            min_shares: 1,
            min_amount: None,
            min_percent: None,
            min_percent_relative: None,
        }
    }

    fn engine(config: RegimeRebalanceConfig) -> RegimeRebalanceEngine {
        RegimeRebalanceEngine::new(
            config,
            vec![policy("AAA"), policy("BBB")],
            Arc::new(NoMarket),
            Arc::new(WeekdayCalendar::us_equities()),
        )
        .unwrap()
    }

    fn permissive() -> RegimeRebalanceConfig {
        RegimeRebalanceConfig {
            enabled: true,
            symbols: vec!["AAA".into(), "BBB".into()],
            lookback_days: 3,
            soft_band: 0.10,
            hard_band: 0.80,
            cooldown_days: 0,
            choppiness_min: 1.0,
            efficiency_max: 1.0,
            ..Default::default()
        }
    }

    fn market() -> MarketInputs {
        let closes = [100.0, 110.0, 100.0, 110.0];
        let points: Vec<PricePoint> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                PricePoint::new(NaiveDate::from_ymd_opt(2024, 1, 2 + i as u32).unwrap(), *c)
            })
            .collect();
        MarketInputs {
            history: align_history(vec![("AAA".into(), points.clone()), ("BBB".into(), points)])
                .unwrap(),
            prices: [("AAA".to_string(), 100.0), ("BBB".to_string(), 100.0)].into(),
        }
    }

    fn account(nlv: f64, aaa: f64, bbb: f64) -> AccountSnapshot {
        AccountSnapshot {
            net_liquidation: nlv,
            option_market_value: 0.0,
            positions: [("AAA".to_string(), aaa), ("BBB".to_string(), bbb)].into(),
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-01-08T18:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(RebalanceMode::Idle.to_string(), "no");
        assert_eq!(RebalanceMode::HardDeficit.to_string(), "hard+deficit");
        assert_eq!(
            serde_json::to_value(RebalanceMode::SoftDeficit).unwrap(),
            serde_json::json!("soft+deficit")
        );
        assert!(RebalanceMode::SoftDeficit.is_band());
        assert!(!RebalanceMode::Flow.is_band());
    }

    #[test]
    fn test_soft_band_rebalance() {
        let d = engine(permissive())
            .evaluate(&account(400.0, 3.0, 1.0), &market(), None, HysteresisState::default(), now())
            .unwrap();
        assert_eq!(d.mode, RebalanceMode::Soft);
        assert_eq!(
            d.orders,
            vec![RebalanceOrder::new("AAA", "NYSE", -1), RebalanceOrder::new("BBB", "NYSE", 1)]
        );
        assert_eq!(d.verdict.band, Band::Soft);
        assert_eq!(d.next_state, HysteresisState::default());
    }

    #[test]
    fn test_idle_inside_bands() {
        let d = engine(permissive())
            .evaluate(&account(400.0, 2.0, 2.0), &market(), None, HysteresisState::default(), now())
            .unwrap();
        assert_eq!(d.mode, RebalanceMode::Idle);
        assert!(d.orders.is_empty());
        assert!(d.symbols.iter().all(|s| s.action == TradeAction::Hold));
    }

    #[test]
    fn test_managed_stocks_base() {
        let config = RegimeRebalanceConfig {
            weight_base: WeightBase::ManagedStocks,
            ..permissive()
        };
        let d = engine(config)
            .evaluate(
                &account(10_000.0, 3.0, 1.0),
                &market(),
                None,
                HysteresisState::default(),
                now(),
            )
            .unwrap();
        assert!((d.diagnostics.total_value - 400.0).abs() < 1e-9);
        assert_eq!(d.orders.len(), 2);
    }

    #[test]
    fn test_non_positive_base_rejected() {
        let err = engine(permissive())
            .evaluate(&account(0.0, 0.0, 0.0), &market(), None, HysteresisState::default(), now())
            .unwrap_err();
        assert!(matches!(err, RebalanceError::InvalidAccount(_)));
    }

    #[test]
    fn test_missing_price_rejected() {
        let mut inputs = market();
        inputs.prices.insert("BBB".into(), f64::NAN);
        let err = engine(permissive())
            .evaluate(&account(400.0, 3.0, 1.0), &inputs, None, HysteresisState::default(), now())
            .unwrap_err();
        assert!(matches!(err, RebalanceError::InvalidPrice { ref symbol, .. } if symbol == "BBB"));
    }

    #[tokio::test]
    async fn test_decide_surfaces_fetch_error() {
        let err = engine(permissive())
            .decide(&account(400.0, 3.0, 1.0), None, HysteresisState::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, RebalanceError::Fetch { .. }));
    }
}
