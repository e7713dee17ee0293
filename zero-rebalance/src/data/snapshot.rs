//! File-backed collaborator.
//!
//! Reads a JSON snapshot holding the account, live prices, daily history and
//! recent executions, and serves it through the collaborator traits. Used by
//! the binary for offline decision passes.
//!
//! ```json
//! {
//!   "account": { "net_liquidation": 400.0, "positions": { "AAA": 3, "BBB": 1 } },
//!   "prices": { "AAA": 100.0, "BBB": 100.0 },
//!   "history": { "AAA": [{ "date": "2024-01-02", "close": 100.0 }] },
//!   "executions": [],
//!   "holidays": ["2024-01-15"]
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::provider::{ExecutionHistory, MarketDataProvider, ProviderError};
use super::{AccountSnapshot, ExecutionFill, PricePoint};

/// Snapshot file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Account state
    pub account: AccountSnapshot,
    /// Live prices keyed by symbol
    #[serde(default)]
    pub prices: BTreeMap<String, f64>,
    /// Daily closes keyed by symbol
    #[serde(default)]
    pub history: BTreeMap<String, Vec<PricePoint>>,
    /// Recent executions
    #[serde(default)]
    pub executions: Vec<ExecutionFill>,
    /// Exchange holidays for the session calendar
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

/// Serves a [`Snapshot`] through the collaborator traits.
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    snapshot: Snapshot,
}

impl SnapshotProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            symbols = snapshot.history.len(),
            executions = snapshot.executions.len(),
            "Snapshot loaded"
        );
        Ok(Self::new(snapshot))
    }

    pub fn account(&self) -> &AccountSnapshot {
        &self.snapshot.account
    }

    pub fn holidays(&self) -> &[NaiveDate] {
        &self.snapshot.holidays
    }
}

#[async_trait]
impl MarketDataProvider for SnapshotProvider {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        calendar_days: u32,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let points = self
            .snapshot
            .history
            .get(symbol)
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no history for {symbol}")))?;

        let Some(last) = points.iter().map(|p| p.date).max() else {
            return Ok(Vec::new());
        };
        let start = last
            .checked_sub_days(Days::new(u64::from(calendar_days)))
            .unwrap_or(NaiveDate::MIN);

        Ok(points.iter().filter(|p| p.date >= start).copied().collect())
    }

    async fn fetch_live_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        self.snapshot
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no live price for {symbol}")))
    }
}

#[async_trait]
impl ExecutionHistory for SnapshotProvider {
    async fn fetch_executions(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionFill>, ProviderError> {
        Ok(self
            .snapshot
            .executions
            .iter()
            .filter(|f| f.time >= since)
            .cloned()
            .collect())
    }
}
