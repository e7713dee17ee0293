//! Anchor-vs-basket ratio gate.
//!
//! Tracks `ln(rest_index / anchor)` and tests whether its daily changes over
//! the lookback window show a persistent drift (t-statistic) or too little
//! variance to trust a mean-reversion rebalance.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::history::AlignedHistory;
use super::proxy::normalize_weights;
use crate::config::RatioGateConfig;
use crate::error::{RebalanceError, Result};

/// Ratio gate diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioGateMetrics {
    /// Gate blocks soft rebalances when true; otherwise shadow mode
    pub enabled: bool,
    pub anchor: String,
    /// Non-anchor symbols forming the rest index
    pub rest: Vec<String>,
    /// Sample variance of log-ratio changes (NaN when the window is short)
    pub variance: f64,
    /// Effective variance floor, `max(var_min, 0)`
    pub var_min: f64,
    /// Drift t-statistic, +inf when undefined
    pub t_stat: f64,
    pub drift_max: f64,
    /// Raw verdict, regardless of `enabled`
    pub ratio_ok: bool,
}

impl RatioGateMetrics {
    /// Whether the gate permits a soft rebalance. Shadow mode always permits.
    pub fn permits_trading(&self) -> bool {
        !self.enabled || self.ratio_ok
    }
}

/// Evaluate the ratio gate over the aligned basket history.
///
/// `target_weights` must cover every basket symbol; the rest index uses the
/// non-anchor weights renormalized to one.
pub fn evaluate_ratio_gate(
    gate: &RatioGateConfig,
    history: &AlignedHistory,
    target_weights: &[(String, f64)],
    lookback_days: usize,
    eps: f64,
) -> Result<RatioGateMetrics> {
    let anchor = gate.anchor.trim();
    let rest: Vec<(String, f64)> = target_weights
        .iter()
        .filter(|(s, _)| s != anchor)
        .cloned()
        .collect();

    if anchor.is_empty()
        || rest.is_empty()
        || !target_weights.iter().any(|(s, _)| s == anchor)
    {
        return Err(RebalanceError::ConfigInvariant(
            "ratio gate requires a valid anchor and rest basket".to_string(),
        ));
    }
    let rest = normalize_weights(&rest)?;

    let anchor_closes = history.closes(anchor).ok_or_else(|| {
        RebalanceError::MisalignedHistory(format!("no aligned history for {anchor}"))
    })?;
    let mut rest_closes = Vec::with_capacity(rest.len());
    for (symbol, w) in &rest {
        let closes = history.closes(symbol).ok_or_else(|| {
            RebalanceError::MisalignedHistory(format!("no aligned history for {symbol}"))
        })?;
        rest_closes.push((*w, closes));
    }

    let ratio: Vec<f64> = (0..history.len())
        .map(|t| {
            let rest_index: f64 = rest_closes.iter().map(|(w, c)| w * c[t]).sum();
            (rest_index.max(eps) / anchor_closes[t].max(eps)).ln()
        })
        .collect();
    let changes: Vec<f64> = ratio.windows(2).map(|p| p[1] - p[0]).collect();

    let (variance, mean, std) = if lookback_days == 0 || changes.len() < lookback_days {
        (f64::NAN, f64::NAN, f64::NAN)
    } else {
        let window = &changes[changes.len() - lookback_days..];
        (window.variance(), window.mean(), window.std_dev())
    };

    let var_min = gate.var_min.max(0.0);
    let (t_stat, ratio_ok) = if variance.is_nan() || mean.is_nan() || std.is_nan() {
        (f64::INFINITY, false)
    } else {
        let t_stat = if std <= 0.0 {
            f64::INFINITY
        } else {
            (mean / (std / (lookback_days as f64).sqrt())).abs()
        };
        (t_stat, variance >= var_min && t_stat <= gate.drift_max)
    };

    Ok(RatioGateMetrics {
        enabled: gate.enabled,
        anchor: anchor.to_string(),
        rest: rest.into_iter().map(|(s, _)| s).collect(),
        variance,
        var_min,
        t_stat,
        drift_max: gate.drift_max,
        ratio_ok,
    })
}
