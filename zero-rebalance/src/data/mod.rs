//! Market, account and execution data consumed by the decision core.
//!
//! The core never talks to a broker or a market-data vendor directly. It
//! consumes the collaborator traits in [`provider`]; [`snapshot`] offers a
//! file-backed implementation and [`calendar`] a weekday session calendar.

pub mod calendar;
pub mod provider;
pub mod snapshot;

pub use calendar::WeekdayCalendar;
pub use provider::{ExecutionHistory, MarketDataProvider, ProviderError, TradingCalendar};
pub use snapshot::SnapshotProvider;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Session date
    pub date: NaiveDate,
    /// Closing price
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Broker account state at the start of an invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Net liquidation value
    pub net_liquidation: f64,
    /// Market value of option positions (excluded from `net_liq_ex_options`)
    #[serde(default)]
    pub option_market_value: f64,
    /// Stock positions keyed by symbol (shares, may be fractional)
    #[serde(default)]
    pub positions: BTreeMap<String, f64>,
}

impl AccountSnapshot {
    /// Whole shares held in `symbol`.
    pub fn whole_shares(&self, symbol: &str) -> i64 {
        self.positions
            .get(symbol)
            .filter(|q| q.is_finite())
            .map_or(0, |q| q.floor() as i64)
    }
}

/// A single execution reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFill {
    /// Broker execution id
    pub exec_id: String,
    /// Symbol
    pub symbol: String,
    /// Order reference tag
    #[serde(default)]
    pub order_ref: Option<String>,
    /// Execution time
    pub time: DateTime<Utc>,
    /// Signed filled shares
    #[serde(default)]
    pub shares: f64,
    /// Fill price
    #[serde(default)]
    pub price: f64,
}

impl ExecutionFill {
    /// Whether this fill was placed by the rebalancer for one of `symbols`.
    pub fn is_rebalance_fill(&self, symbols: &[String], order_ref_prefix: &str) -> bool {
        self.order_ref
            .as_deref()
            .is_some_and(|r| r.starts_with(order_ref_prefix))
            && symbols.iter().any(|s| s == &self.symbol)
    }
}

/// Most recent rebalance-tagged fill time among `fills`.
pub fn latest_rebalance_fill(
    fills: &[ExecutionFill],
    symbols: &[String],
    order_ref_prefix: &str,
) -> Option<DateTime<Utc>> {
    fills
        .iter()
        .filter(|f| f.is_rebalance_fill(symbols, order_ref_prefix))
        .map(|f| f.time)
        .max()
}
