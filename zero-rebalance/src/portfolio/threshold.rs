//! Minimum-trade filter.
//!
//! Zeroes proposed trades that are too small to be worth placing and records
//! why, for the rationale table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{SymbolPolicy, TradeDirection};

/// Final action for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TradeAction {
    Buy { shares: i64 },
    Sell { shares: i64 },
    Hold,
    /// Side blocked by the symbol's direction policy
    SkipMode { direction: TradeDirection },
    SkipNoTrading,
    SkipMinShares { min_shares: u32 },
    SkipMinAmount { min_amount: f64, trade_amount: f64 },
    SkipRelative { min_relative: f64 },
}

impl TradeAction {
    pub fn is_trade(&self) -> bool {
        matches!(self, Self::Buy { .. } | Self::Sell { .. })
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy { shares } => write!(f, "Buy {shares}"),
            Self::Sell { shares } => write!(f, "Sell {shares}"),
            Self::Hold => write!(f, "Hold"),
            Self::SkipMode { direction } => write!(f, "Skip (mode={direction})"),
            Self::SkipNoTrading => write!(f, "Skip (no_trading)"),
            Self::SkipMinShares { min_shares } => {
                write!(f, "Skip (below min shares {min_shares})")
            }
            Self::SkipMinAmount {
                min_amount,
                trade_amount,
            } => write!(
                f,
                "Skip (below min amount ${min_amount:.2}; would be ${trade_amount:.2})"
            ),
            Self::SkipRelative { min_relative } => {
                write!(f, "Skip (below relative threshold {:.2}%)", min_relative * 100.0)
            }
        }
    }
}

/// Filter outcome for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredTrade {
    /// Signed shares to trade after filtering
    pub shares: i64,
    pub action: TradeAction,
}

/// Valuation context for a proposed trade.
#[derive(Debug, Clone, Copy)]
pub struct TradeContext {
    pub price: f64,
    pub current_value: f64,
    pub target_value: f64,
    /// Net liquidation value for percent thresholds
    pub net_liquidation: f64,
}

/// Apply the symbol's direction and minimum-size policy to `proposed` shares.
pub fn filter_trade(policy: &SymbolPolicy, proposed: i64, ctx: &TradeContext) -> FilteredTrade {
    let skip = |action| FilteredTrade { shares: 0, action };

    if !policy.trading_allowed {
        return skip(TradeAction::SkipNoTrading);
    }
    if proposed == 0 {
        return skip(TradeAction::Hold);
    }
    if (proposed > 0 && !policy.direction.allows_buy())
        || (proposed < 0 && !policy.direction.allows_sell())
    {
        return skip(TradeAction::SkipMode {
            direction: policy.direction,
        });
    }

    let trade_abs = proposed.unsigned_abs();
    let trade_amount = trade_abs as f64 * ctx.price;

    let percent_amount = policy.min_percent.map(|p| ctx.net_liquidation * p);
    let min_amount = match (policy.min_amount, percent_amount) {
        (Some(a), Some(p)) => Some(a.max(p)),
        (a, p) => a.or(p),
    };

    if trade_abs < u64::from(policy.min_shares) {
        return skip(TradeAction::SkipMinShares {
            min_shares: policy.min_shares,
        });
    }
    if let Some(min_amount) = min_amount {
        if trade_amount < min_amount {
            return skip(TradeAction::SkipMinAmount {
                min_amount,
                trade_amount,
            });
        }
    }
    if let Some(min_relative) = policy.min_percent_relative {
        if ctx.target_value > 0.0 {
            let relative_diff = if proposed > 0 {
                (ctx.target_value - ctx.current_value) / ctx.target_value
            } else {
                (ctx.current_value - ctx.target_value) / ctx.target_value
            };
            if relative_diff < min_relative {
                return skip(TradeAction::SkipRelative { min_relative });
            }
        }
    }

    let action = if proposed > 0 {
        TradeAction::Buy { shares: proposed }
    } else {
        TradeAction::Sell { shares: -proposed }
    };
    FilteredTrade {
        shares: proposed,
        action,
    }
}
