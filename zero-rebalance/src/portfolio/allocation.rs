//! Share allocation.
//!
//! Converts the selected mode into signed share deltas per symbol.
//!
//! # Modes
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────┐
//! │ hard / soft  │ target - current (hard scaled by fraction), then a   │
//! │              │ deficit cleanup pass if still short past the stop    │
//! ├──────────────┼──────────────────────────────────────────────────────┤
//! │ deficit      │ sell overweights pro-rata by overage, then sell into │
//! │              │ target pro-rata by weight until covered              │
//! ├──────────────┼──────────────────────────────────────────────────────┤
//! │ flow         │ buy underweights (cash > 0) or sell overweights      │
//! │              │ (cash < 0) pro-rata by gap, only when gaps agree     │
//! └──────────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Buys round down and sells round up, each capped one share past target so
//! no pass overshoots cash or an existing position.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Shares of slack around the target before a symbol counts as off-target.
pub const SHARE_TOLERANCE: i64 = 1;

/// Upper bound on below-target deficit passes.
pub const MAX_DEFICIT_PASSES: usize = 1_000;

/// Signed share deltas keyed by symbol.
pub type ShareDeltas = BTreeMap<String, i64>;

/// Per-symbol book entry for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    /// Live price (> 0)
    pub price: f64,
    /// Target weight (> 0)
    pub weight: f64,
    pub current_shares: i64,
    pub target_shares: i64,
    /// False when the symbol must not receive orders
    pub trading_allowed: bool,
}

impl Holding {
    /// `target_shares - current_shares`
    pub fn share_gap(&self) -> i64 {
        self.target_shares - self.current_shares
    }

    pub fn current_value(&self) -> f64 {
        self.current_shares as f64 * self.price
    }
}

/// Allocates share deltas across a basket.
#[derive(Debug, Clone)]
pub struct ShareAllocator<'a> {
    holdings: &'a [Holding],
    flow_imbalance_tau: f64,
}

impl<'a> ShareAllocator<'a> {
    pub fn new(holdings: &'a [Holding], flow_imbalance_tau: f64) -> Self {
        Self {
            holdings,
            flow_imbalance_tau,
        }
    }

    fn tradable(&self) -> impl Iterator<Item = &'a Holding> {
        self.holdings.iter().filter(|h| h.trading_allowed)
    }

    /// Current shares with `deltas` applied.
    pub fn shares_after(&self, deltas: &ShareDeltas) -> ShareDeltas {
        self.holdings
            .iter()
            .map(|h| {
                let delta = deltas.get(&h.symbol).copied().unwrap_or(0);
                (h.symbol.clone(), h.current_shares + delta)
            })
            .collect()
    }

    /// Market value of `shares`.
    pub fn invested_value(&self, shares: &ShareDeltas) -> f64 {
        self.holdings
            .iter()
            .map(|h| shares.get(&h.symbol).copied().unwrap_or(0) as f64 * h.price)
            .sum()
    }

    /// Move every tradable symbol to target. `fraction` scales the gap and
    /// rounds half to even.
    pub fn band_orders(&self, fraction: Option<f64>) -> ShareDeltas {
        let mut orders = ShareDeltas::new();
        for h in self.tradable() {
            let mut desired = h.share_gap();
            if let Some(fraction) = fraction {
                if (fraction - 1.0).abs() > f64::EPSILON {
                    desired = (desired as f64 * fraction).round_ties_even() as i64;
                }
            }
            if desired != 0 {
                *orders.entry(h.symbol.clone()).or_insert(0) += desired;
            }
        }
        orders
    }

    /// Sell down to raise `amount` of cash, starting from `shares_state`.
    ///
    /// Overweight symbols (more than one share above target) sell first,
    /// pro-rata by overage, never below one share under target. Any shortfall
    /// is then sold pro-rata by weight across all tradable symbols, repeating
    /// until covered, nothing sells, or [`MAX_DEFICIT_PASSES`] is reached.
    pub fn deficit_orders(&self, shares_state: &ShareDeltas, mut amount: f64) -> ShareDeltas {
        let mut orders = ShareDeltas::new();
        if amount <= 0.0 {
            return orders;
        }
        let initial_amount = amount;
        let held = |h: &Holding| shares_state.get(&h.symbol).copied().unwrap_or(0);

        let overweight: Vec<(&Holding, i64)> = self
            .tradable()
            .filter_map(|h| {
                let over = held(h) - (h.target_shares + SHARE_TOLERANCE);
                (over > 0).then_some((h, over))
            })
            .collect();
        let total_over: i64 = overweight.iter().map(|(_, over)| over).sum();

        for (h, over) in &overweight {
            let max_sell = (held(h) - (h.target_shares - SHARE_TOLERANCE).max(0)).max(0);
            if max_sell <= 0 {
                continue;
            }
            let alloc = (initial_amount * (*over as f64 / total_over as f64)).min(amount);
            let sell = ((alloc / h.price).ceil() as i64).min(max_sell);
            if sell > 0 {
                *orders.entry(h.symbol.clone()).or_insert(0) -= sell;
                amount -= sell as f64 * h.price;
                if amount <= 0.0 {
                    return orders;
                }
            }
        }

        let mut passes = 0;
        while amount > 0.0 {
            if passes == MAX_DEFICIT_PASSES {
                warn!(remaining = amount, passes, "Deficit allocation hit pass limit");
                break;
            }
            passes += 1;

            let mut any_sold = false;
            for h in self.tradable() {
                let max_sell = held(h) + orders.get(&h.symbol).copied().unwrap_or(0);
                if max_sell <= 0 {
                    continue;
                }
                let alloc = amount * h.weight;
                let sell = ((alloc / h.price).ceil() as i64).min(max_sell);
                if sell <= 0 {
                    continue;
                }
                *orders.entry(h.symbol.clone()).or_insert(0) -= sell;
                amount -= sell as f64 * h.price;
                any_sold = true;
                if amount <= 0.0 {
                    break;
                }
            }
            if !any_sold {
                break;
            }
        }

        orders
    }

    /// Deploy (`amount > 0`) or raise (`amount < 0`) cash along the share gaps.
    ///
    /// Only symbols more than one share off target take part, and only when
    /// their net gap points the same way as the cash by more than
    /// `flow_imbalance_tau` of the total gap.
    pub fn flow_orders(&self, amount: f64) -> ShareDeltas {
        let mut orders = ShareDeltas::new();
        if amount == 0.0 {
            return orders;
        }

        let active: Vec<&Holding> = self
            .tradable()
            .filter(|h| h.share_gap().abs() > SHARE_TOLERANCE)
            .collect();
        let net_gap: i64 = active.iter().map(|h| h.share_gap()).sum();
        let tot_gap: i64 = active.iter().map(|h| h.share_gap().abs()).sum();
        if tot_gap <= 0 {
            return orders;
        }

        let threshold = self.flow_imbalance_tau * tot_gap as f64;
        if amount > 0.0 && (net_gap as f64) <= threshold {
            return orders;
        }
        if amount < 0.0 && (net_gap as f64) >= -threshold {
            return orders;
        }

        if amount > 0.0 {
            let total_deficit: i64 = active.iter().map(|h| h.share_gap().max(0)).sum();
            if total_deficit <= 0 {
                return orders;
            }
            for h in &active {
                let deficit = h.share_gap().max(0);
                if deficit <= 0 {
                    continue;
                }
                let max_buy = (h.target_shares + SHARE_TOLERANCE - h.current_shares).max(0);
                let alloc = amount * (deficit as f64 / total_deficit as f64);
                let buy = ((alloc / h.price).floor() as i64).min(max_buy);
                if buy > 0 {
                    orders.insert(h.symbol.clone(), buy);
                }
            }
        } else {
            let need = -amount;
            let total_excess: i64 = active.iter().map(|h| (-h.share_gap()).max(0)).sum();
            if total_excess <= 0 {
                return orders;
            }
            for h in &active {
                let excess = (-h.share_gap()).max(0);
                if excess <= 0 {
                    continue;
                }
                let max_sell =
                    (h.current_shares - (h.target_shares - SHARE_TOLERANCE).max(0)).max(0);
                let alloc = need * (excess as f64 / total_excess as f64);
                let sell = ((alloc / h.price).ceil() as i64).min(max_sell);
                if sell > 0 {
                    orders.insert(h.symbol.clone(), -sell);
                }
            }
        }

        orders
    }
}

/// Add `extra` into `orders`, dropping symbols that net to zero.
pub fn merge_deltas(orders: &mut ShareDeltas, extra: ShareDeltas) {
    for (symbol, delta) in extra {
        if delta == 0 {
            continue;
        }
        let entry = orders.entry(symbol.clone()).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            orders.remove(&symbol);
        }
    }
}
