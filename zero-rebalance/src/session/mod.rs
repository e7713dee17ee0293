//! Rebalance session: one decision pass with persisted state.
//!
//! # Architecture
//!
//! ```text
//! RebalanceSession::run_once
//!        |
//!    +---+--------------+-------------------+
//!    |                  |                   |
//!    v                  v                   v
//! DecisionRecorder   ExecutionHistory   RegimeRebalanceEngine
//! (load state)       (last fill)        (decide)
//!    |
//!    v
//! StateStore (SQLite): events, executions
//! ```
//!
//! The hysteresis state is read once at the start and written once at the
//! end. Concurrent sessions over the same store are not supported.

mod recorder;
mod state;

pub use recorder::{
    gate_status, render_rationale_table, DecisionRecord, DecisionRecorder, GATE_EVENT,
    SUMMARY_EVENT,
};
pub use state::{StateStore, STATE_EVENT};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, Instrument};
use zero_common::logging::generate_trace_id;

use crate::data::{latest_rebalance_fill, AccountSnapshot, ExecutionHistory};
use crate::engine::{RebalanceDecision, RegimeRebalanceEngine};

/// Result of [`RebalanceSession::run_once`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub run_id: String,
    pub decision: RebalanceDecision,
    pub record: DecisionRecord,
    /// Rendered rationale table
    pub rationale: String,
}

/// Drives the engine against its collaborators and the state store.
pub struct RebalanceSession {
    engine: RegimeRebalanceEngine,
    executions: Arc<dyn ExecutionHistory>,
    recorder: DecisionRecorder,
}

impl RebalanceSession {
    pub fn new(
        engine: RegimeRebalanceEngine,
        executions: Arc<dyn ExecutionHistory>,
        store: Option<StateStore>,
    ) -> Self {
        Self {
            engine,
            executions,
            recorder: DecisionRecorder::new(store),
        }
    }

    pub fn engine(&self) -> &RegimeRebalanceEngine {
        &self.engine
    }

    pub fn recorder(&self) -> &DecisionRecorder {
        &self.recorder
    }

    /// Most recent rebalance-tagged fill within the order history window.
    ///
    /// With a store, fetched fills are recorded first and the store answers
    /// the query, so fills older than the broker's own window still count.
    pub async fn last_rebalance_fill(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let cfg = self.engine.config();
        let since = now - Duration::days(i64::from(cfg.order_history_lookback_days.max(1)));
        let symbols = self.engine.symbols();

        let fills = self
            .executions
            .fetch_executions(since)
            .await
            .context("Failed to fetch execution history")?;

        match self.recorder.store() {
            Some(store) => {
                store.record_executions(&fills)?;
                store.last_rebalance_fill(&symbols, &cfg.order_ref_prefix, since)
            }
            None => Ok(latest_rebalance_fill(&fills, &symbols, &cfg.order_ref_prefix)),
        }
    }

    /// Run one decision pass and persist its outcome.
    ///
    /// Any error leaves the stored state untouched and yields no orders.
    pub async fn run_once(
        &self,
        account: &AccountSnapshot,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome> {
        let run_id = generate_trace_id();
        let span = tracing::info_span!("regime_rebalance", run_id = %run_id);

        async {
            let prior = self.recorder.load_state()?;
            let last_fill = self.last_rebalance_fill(now).await?;
            debug!(?prior, ?last_fill, "Session inputs loaded");

            let decision = self
                .engine
                .decide(account, last_fill, prior, now)
                .await
                .context("Regime rebalance decision failed")?;

            let record = self.recorder.record(&run_id, now, &decision)?;
            let rationale = render_rationale_table(&decision);

            info!(
                mode = %decision.mode,
                orders = decision.orders.len(),
                flow_active = decision.next_state.flow_active,
                deficit_active = decision.next_state.deficit_active,
                "Regime rebalance session complete"
            );

            Ok(SessionOutcome {
                run_id: run_id.clone(),
                decision,
                record,
                rationale,
            })
        }
        .instrument(span)
        .await
    }
}
