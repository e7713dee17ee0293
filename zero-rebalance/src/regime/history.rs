//! History alignment.
//!
//! Fetches daily closes for every basket symbol concurrently and restricts
//! them to the dates every symbol traded on.

use chrono::NaiveDate;
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::data::{MarketDataProvider, PricePoint};
use crate::error::{RebalanceError, Result};

/// Calendar days of history needed to cover `lookback_days + 1` sessions plus
/// the cooldown window, with slack for weekends and holidays.
pub fn history_calendar_days(lookback_days: usize, cooldown_days: i64) -> u32 {
    let sessions = lookback_days as f64 + 1.0 + cooldown_days.max(0) as f64;
    (sessions * 7.0 / 5.0).ceil() as u32 + 5
}

/// Closes restricted to the common trading dates of the basket.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedHistory {
    dates: Vec<NaiveDate>,
    closes: BTreeMap<String, Vec<f64>>,
}

impl AlignedHistory {
    /// Sorted common dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Closes of `symbol`, one per common date.
    pub fn closes(&self, symbol: &str) -> Option<&[f64]> {
        self.closes.get(symbol).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Last common date.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Align per-symbol histories onto their common dates.
///
/// Later points for a duplicated date replace earlier ones.
pub fn align_history(histories: Vec<(String, Vec<PricePoint>)>) -> Result<AlignedHistory> {
    if histories.is_empty() {
        return Err(RebalanceError::MisalignedHistory(
            "no symbols to align".to_string(),
        ));
    }

    let by_symbol: Vec<(String, BTreeMap<NaiveDate, f64>)> = histories
        .into_iter()
        .map(|(symbol, points)| {
            let map = points.into_iter().map(|p| (p.date, p.close)).collect();
            (symbol, map)
        })
        .collect();

    let mut common: BTreeSet<NaiveDate> = by_symbol[0].1.keys().copied().collect();
    for (_, map) in &by_symbol[1..] {
        common.retain(|d| map.contains_key(d));
    }

    if common.is_empty() {
        return Err(RebalanceError::MisalignedHistory(
            "regime rebalance requires aligned history; no common dates".to_string(),
        ));
    }
    if common.len() < 2 {
        return Err(RebalanceError::InsufficientHistory(format!(
            "regime rebalance requires aligned history; got {} common date",
            common.len()
        )));
    }

    let dates: Vec<NaiveDate> = common.into_iter().collect();
    let mut closes = BTreeMap::new();
    for (symbol, map) in by_symbol {
        let mut series = Vec::with_capacity(dates.len());
        for date in &dates {
            let close = map[date];
            if !(close.is_finite() && close > 0.0) {
                return Err(RebalanceError::invalid_price(
                    &symbol,
                    format!("invalid historical close {close} on {date}"),
                ));
            }
            series.push(close);
        }
        closes.insert(symbol, series);
    }

    Ok(AlignedHistory { dates, closes })
}

/// Fetch every symbol's history concurrently and align it.
///
/// Any failed fetch aborts the whole alignment.
pub async fn fetch_aligned_history(
    provider: &dyn MarketDataProvider,
    symbols: &[String],
    lookback_days: usize,
    cooldown_days: i64,
) -> Result<AlignedHistory> {
    let calendar_days = history_calendar_days(lookback_days, cooldown_days);

    let fetches = symbols.iter().map(|symbol| async move {
        provider
            .fetch_history(symbol, calendar_days)
            .await
            .map(|points| (symbol.clone(), points))
            .map_err(|source| RebalanceError::Fetch {
                symbol: symbol.clone(),
                source,
            })
    });
    let histories = try_join_all(fetches).await?;

    let aligned = align_history(histories)?;
    debug!(
        provider = provider.name(),
        calendar_days,
        aligned = aligned.len(),
        "History aligned"
    );
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn series(closes: &[(u32, f64)]) -> Vec<PricePoint> {
        closes.iter().map(|(d, c)| PricePoint::new(day(*d), *c)).collect()
    }

    #[test]
    fn test_history_calendar_days() {
        // ceil((40 + 1 + 5) * 7 / 5) + 5 = ceil(64.4) + 5
        assert_eq!(history_calendar_days(40, 5), 70);
        // negative cooldown counts as zero
        assert_eq!(history_calendar_days(3, -2), 11);
    }

    #[test]
    fn test_align_intersects_dates() {
        let aligned = align_history(vec![
            ("AAA".into(), series(&[(2, 100.0), (3, 101.0), (4, 102.0)])),
            ("BBB".into(), series(&[(3, 50.0), (4, 51.0), (5, 52.0)])),
        ])
        .unwrap();

        assert_eq!(aligned.dates(), &[day(3), day(4)]);
        assert_eq!(aligned.closes("AAA").unwrap(), &[101.0, 102.0]);
        assert_eq!(aligned.closes("BBB").unwrap(), &[50.0, 51.0]);
        assert_eq!(aligned.last_date(), Some(day(4)));
    }

    #[test]
    fn test_align_no_common_dates() {
        let result = align_history(vec![
            ("AAA".into(), series(&[(2, 100.0), (3, 101.0)])),
            ("BBB".into(), series(&[(4, 50.0), (5, 51.0)])),
        ]);
        assert!(matches!(result, Err(RebalanceError::MisalignedHistory(_))));
    }

    #[test]
    fn test_align_single_common_date() {
        let result = align_history(vec![
            ("AAA".into(), series(&[(2, 100.0), (3, 101.0)])),
            ("BBB".into(), series(&[(3, 50.0), (4, 51.0)])),
        ]);
        assert!(matches!(result, Err(RebalanceError::InsufficientHistory(_))));
    }

    #[test]
    fn test_align_rejects_invalid_close() {
        let result = align_history(vec![
            ("AAA".into(), series(&[(2, 100.0), (3, 0.0)])),
            ("BBB".into(), series(&[(2, 50.0), (3, 51.0)])),
        ]);
        assert!(matches!(
            result,
            Err(RebalanceError::InvalidPrice { ref symbol, .. }) if symbol == "AAA"
        ));

        let result = align_history(vec![("AAA".into(), series(&[(2, f64::NAN), (3, 1.0)]))]);
        assert!(matches!(result, Err(RebalanceError::InvalidPrice { .. })));
    }

    #[test]
    fn test_invalid_close_outside_common_dates_ignored() {
        let aligned = align_history(vec![
            ("AAA".into(), series(&[(1, -1.0), (2, 100.0), (3, 101.0)])),
            ("BBB".into(), series(&[(2, 50.0), (3, 51.0)])),
        ])
        .unwrap();
        assert_eq!(aligned.len(), 2);
    }
}
