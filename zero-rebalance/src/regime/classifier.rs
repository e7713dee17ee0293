//! Regime classifier.
//!
//! Mechanical rebalancing is considered safe when the basket proxy is noisy
//! and non-trending: high choppiness and low trend efficiency.

use serde::{Deserialize, Serialize};

use crate::error::{RebalanceError, Result};

/// Regime diagnostics over the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeMetrics {
    /// `sqrt(Σ r²) / |Σ r|` over log returns
    pub choppiness: f64,
    /// Net move over total path length
    pub efficiency: f64,
    /// `choppiness >= choppiness_min && efficiency <= efficiency_max`
    pub regime_ok: bool,
}

/// Classify the last `lookback_days + 1` points of `series`.
pub fn classify_regime(
    series: &[f64],
    lookback_days: usize,
    choppiness_min: f64,
    efficiency_max: f64,
    eps: f64,
) -> Result<RegimeMetrics> {
    let needed = lookback_days + 1;
    if series.len() < needed || needed < 2 {
        return Err(RebalanceError::InsufficientHistory(format!(
            "regime rebalance requires full lookback history: need {needed} points, got {}",
            series.len()
        )));
    }

    let window = &series[series.len() - needed..];

    let (mut sum_sq, mut sum) = (0.0, 0.0);
    for pair in window.windows(2) {
        let r = (pair[1].max(eps) / pair[0].max(eps)).ln();
        sum_sq += r * r;
        sum += r;
    }
    let choppiness = sum_sq.sqrt() / sum.abs().max(eps);

    let path: f64 = window.windows(2).map(|p| (p[1] - p[0]).abs()).sum();
    let efficiency = (window[needed - 1] - window[0]).abs() / path.max(eps);

    Ok(RegimeMetrics {
        choppiness,
        efficiency,
        regime_ok: choppiness >= choppiness_min && efficiency <= efficiency_max,
    })
}
