//! Basket proxy index.

use super::history::AlignedHistory;
use crate::error::{RebalanceError, Result};

/// Normalize `weights` to sum to one.
pub(crate) fn normalize_weights(weights: &[(String, f64)]) -> Result<Vec<(String, f64)>> {
    let total: f64 = weights.iter().map(|(_, w)| *w).sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(RebalanceError::ConfigInvariant(format!(
            "proxy weights must sum to a positive value, got {total}"
        )));
    }
    Ok(weights
        .iter()
        .map(|(symbol, w)| (symbol.clone(), w / total))
        .collect())
}

/// Build the blended basket index: `S[0] = 1`,
/// `S[t] = S[t-1] * Σ w * close[t] / close[t-1]`.
///
/// `weights` may be target weights or invested-value weights; they are
/// normalized here.
pub fn build_proxy_series(history: &AlignedHistory, weights: &[(String, f64)]) -> Result<Vec<f64>> {
    let weights = normalize_weights(weights)?;

    let mut columns = Vec::with_capacity(weights.len());
    for (symbol, w) in &weights {
        let closes = history.closes(symbol).ok_or_else(|| {
            RebalanceError::MisalignedHistory(format!("no aligned history for {symbol}"))
        })?;
        columns.push((*w, closes));
    }

    let mut series = Vec::with_capacity(history.len());
    series.push(1.0);
    for t in 1..history.len() {
        let growth: f64 = columns
            .iter()
            .map(|(w, closes)| w * closes[t] / closes[t - 1])
            .sum();
        let prev = series[t - 1];
        series.push(prev * growth);
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PricePoint;
    use crate::regime::history::align_history;
    use chrono::NaiveDate;

    fn history() -> AlignedHistory {
        let points = |closes: &[f64]| -> Vec<PricePoint> {
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    PricePoint::new(NaiveDate::from_ymd_opt(2024, 1, 2 + i as u32).unwrap(), *c)
                })
                .collect()
        };
        align_history(vec![
            ("AAA".into(), points(&[100.0, 110.0, 121.0])),
            ("BBB".into(), points(&[50.0, 50.0, 25.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_proxy_starts_at_one() {
        let s = build_proxy_series(&history(), &[("AAA".into(), 1.0)]).unwrap();
        assert_eq!(s.len(), 3);
        assert!((s[0] - 1.0).abs() < 1e-12);
        assert!((s[1] - 1.1).abs() < 1e-12);
        assert!((s[2] - 1.21).abs() < 1e-12);
    }

    #[test]
    fn test_proxy_blends_normalized_weights() {
        // weights 2:2 normalize to 0.5/0.5
        let weights: [(String, f64); 2] = [("AAA".into(), 2.0), ("BBB".into(), 2.0)];
        let s = build_proxy_series(&history(), &weights).unwrap();
        assert!((s[1] - 1.05).abs() < 1e-12);
        // 1.05 * (0.5 * 1.1 + 0.5 * 0.5)
        assert!((s[2] - 1.05 * 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_proxy_rejects_zero_weights() {
        let result = build_proxy_series(&history(), &[("AAA".into(), 0.0)]);
        assert!(matches!(result, Err(RebalanceError::ConfigInvariant(_))));
    }

    #[test]
    fn test_proxy_rejects_unknown_symbol() {
        let result = build_proxy_series(&history(), &[("CCC".into(), 1.0)]);
        assert!(matches!(result, Err(RebalanceError::MisalignedHistory(_))));
    }
}
