//! Decision recording and rationale rendering.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::{StateStore, STATE_EVENT};
use crate::engine::{
    Diagnostics, GateVerdict, RebalanceDecision, RebalanceMode, RebalanceOrder, SymbolDecision,
};
use crate::gates::{Band, HysteresisState};

/// Event type for the full gate diagnostics.
pub const GATE_EVENT: &str = "regime_rebalance_gate";
/// Event type for the per-invocation summary.
pub const SUMMARY_EVENT: &str = "regime_rebalance_summary";

/// Audit record of one decision pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub symbols: Vec<String>,
    pub mode: RebalanceMode,
    pub verdict: GateVerdict,
    pub diagnostics: Diagnostics,
    pub orders: Vec<RebalanceOrder>,
    pub prior_state: HysteresisState,
    pub next_state: HysteresisState,
}

impl DecisionRecord {
    pub fn new(run_id: &str, timestamp: DateTime<Utc>, decision: &RebalanceDecision) -> Self {
        Self {
            run_id: run_id.to_string(),
            timestamp,
            symbols: decision.symbols.iter().map(|s| s.symbol.clone()).collect(),
            mode: decision.mode,
            verdict: decision.verdict,
            diagnostics: decision.diagnostics.clone(),
            orders: decision.orders.clone(),
            prior_state: decision.prior_state,
            next_state: decision.next_state,
        }
    }
}

#[derive(Serialize)]
struct SummaryPayload<'a> {
    run_id: &'a str,
    mode: RebalanceMode,
    order_count: usize,
    total_value: f64,
    excess_cash: f64,
    symbols: &'a [SymbolDecision],
}

/// Persists decisions and hysteresis state.
///
/// Without a store, state always starts from the default and nothing is
/// written.
#[derive(Clone, Default)]
pub struct DecisionRecorder {
    store: Option<StateStore>,
}

impl DecisionRecorder {
    pub fn new(store: Option<StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Option<&StateStore> {
        self.store.as_ref()
    }

    /// Hysteresis state left by the previous invocation.
    pub fn load_state(&self) -> Result<HysteresisState> {
        match &self.store {
            Some(store) => store.load_hysteresis_state(),
            None => Ok(HysteresisState::default()),
        }
    }

    /// Write the gate, summary and state events for `decision`.
    pub fn record(
        &self,
        run_id: &str,
        timestamp: DateTime<Utc>,
        decision: &RebalanceDecision,
    ) -> Result<DecisionRecord> {
        let record = DecisionRecord::new(run_id, timestamp, decision);
        let Some(store) = &self.store else {
            return Ok(record);
        };

        store.record_events(&[
            (GATE_EVENT, serde_json::to_value(&record)?),
            (
                SUMMARY_EVENT,
                serde_json::to_value(SummaryPayload {
                    run_id,
                    mode: decision.mode,
                    order_count: decision.orders.len(),
                    total_value: decision.diagnostics.total_value,
                    excess_cash: decision.diagnostics.excess_cash,
                    symbols: &decision.symbols,
                })?,
            ),
            (STATE_EVENT, serde_json::to_value(decision.next_state)?),
        ])?;

        debug!(run_id, mode = %decision.mode, "Decision recorded");
        Ok(record)
    }
}

// ============================================================================
// Rationale Table
// ============================================================================

fn dfmt(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", -value)
    } else {
        format!("${value:.2}")
    }
}

fn pfmt(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn ok_no(flag: bool) -> &'static str {
    if flag {
        "ok"
    } else {
        "no"
    }
}

/// Gate summary shared by every rationale row.
pub fn gate_status(mode: RebalanceMode, verdict: &GateVerdict) -> String {
    let band = match verdict.band {
        Band::Hard => "hard",
        Band::Soft => "soft",
        Band::None => "no",
    };
    format!(
        "mode={mode} band={band} regime={} cooldown={} flow={} deficit={}",
        ok_no(verdict.regime_ok),
        ok_no(verdict.cooldown_ok),
        on_off(verdict.flow_gate),
        on_off(verdict.deficit_gate),
    )
}

/// Render the per-symbol rationale as a plain-text table.
pub fn render_rationale_table(decision: &RebalanceDecision) -> String {
    const HEADERS: [&str; 6] = ["Symbol", "Weights", "Value", "Shares", "Gate", "Action"];

    let gate = gate_status(decision.mode, &decision.verdict);
    let rows: Vec<[String; 6]> = decision
        .symbols
        .iter()
        .map(|s| {
            [
                s.symbol.clone(),
                format!(
                    "{}->{} ({})",
                    pfmt(s.current_weight),
                    pfmt(s.target_weight),
                    pfmt(s.current_weight - s.target_weight)
                ),
                format!(
                    "{}->{} ({})",
                    dfmt(s.current_value),
                    dfmt(s.target_value),
                    dfmt(s.current_value - s.target_value)
                ),
                format!(
                    "{}->{} ({:+})",
                    s.current_shares,
                    s.target_shares,
                    s.current_shares - s.target_shares
                ),
                gate.clone(),
                s.action.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::from("Regime-aware rebalancing summary\n");
    out.push_str(&line(&HEADERS[..]));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells[..]));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightBase;
    use crate::gates::{CooldownOutcome, RailThresholds};
    use crate::portfolio::TradeAction;
    use crate::regime::RegimeMetrics;

    fn decision() -> RebalanceDecision {
        let regime = RegimeMetrics {
            choppiness: 1.7,
            efficiency: 0.33,
            regime_ok: true,
        };
        RebalanceDecision {
            mode: RebalanceMode::Soft,
            verdict: GateVerdict {
                regime_ok: true,
                band: Band::Soft,
                cooldown_ok: true,
                ratio_ok: None,
                flow_gate: false,
                deficit_gate: false,
            },
            orders: vec![RebalanceOrder::new("AAA", "NYSE", -1)],
            symbols: vec![SymbolDecision {
                symbol: "AAA".into(),
                market_price: 100.0,
                current_weight: 0.75,
                target_weight: 0.5,
                current_value: 300.0,
                target_value: 200.0,
                current_shares: 3,
                target_shares: 2,
                proposed_shares: -1,
                shares_to_trade: -1,
                trading_allowed: true,
                action: TradeAction::Sell { shares: 1 },
            }],
            diagnostics: Diagnostics {
                weight_base: WeightBase::NetLiqExOptions,
                total_value: 400.0,
                invested_value: 400.0,
                excess_cash: 0.0,
                max_drift: 0.5,
                soft_breach: true,
                hard_breach: false,
                regime,
                target_regime: regime,
                cooldown: CooldownOutcome {
                    ok: true,
                    elapsed: None,
                    degraded: false,
                },
                last_fill: None,
                rails: RailThresholds::from_fractions(400.0, 0.025, 0.0125, 0.06, 0.03),
                ratio_gate: None,
                history_end: None,
            },
            prior_state: HysteresisState::default(),
            next_state: HysteresisState {
                flow_active: false,
                deficit_active: true,
            },
        }
    }

    #[test]
    fn test_formatters() {
        assert_eq!(dfmt(1234.5), "$1234.50");
        assert_eq!(dfmt(-100.0), "-$100.00");
        assert_eq!(pfmt(0.25), "25.00%");
    }

    #[test]
    fn test_rationale_table() {
        let table = render_rationale_table(&decision());
        assert!(table.contains("Symbol"));
        assert!(table.contains("75.00%->50.00% (25.00%)"));
        assert!(table.contains("$300.00->$200.00 ($100.00)"));
        assert!(table.contains("3->2 (+1)"));
        assert!(table.contains("mode=soft band=soft regime=ok cooldown=ok flow=off deficit=off"));
        assert!(table.contains("Sell 1"));
    }

    #[test]
    fn test_record_without_store() {
        let recorder = DecisionRecorder::default();
        let record = recorder.record("run-1", Utc::now(), &decision()).unwrap();
        assert_eq!(record.run_id, "run-1");
        assert_eq!(recorder.load_state().unwrap(), HysteresisState::default());
    }

    #[test]
    fn test_record_persists_events() {
        let store = StateStore::in_memory().unwrap();
        let recorder = DecisionRecorder::new(Some(store.clone()));
        recorder.record("run-1", Utc::now(), &decision()).unwrap();

        let gate = store.last_event_payload(GATE_EVENT).unwrap().unwrap();
        assert_eq!(gate["mode"], "soft");
        assert_eq!(gate["run_id"], "run-1");
        assert_eq!(gate["orders"][0]["shares"], -1);

        let summary = store.last_event_payload(SUMMARY_EVENT).unwrap().unwrap();
        assert_eq!(summary["order_count"], 1);

        assert!(recorder.load_state().unwrap().deficit_active);
    }

    #[test]
    fn test_failed_record_keeps_prior_state() {
        let store = StateStore::in_memory().unwrap();
        let recorder = DecisionRecorder::new(Some(store.clone()));
        store
            .conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_summary BEFORE INSERT ON events
                 WHEN NEW.event_type = 'regime_rebalance_summary'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        assert!(recorder.record("run-1", Utc::now(), &decision()).is_err());
        assert_eq!(store.count_events(GATE_EVENT).unwrap(), 0);
        assert_eq!(recorder.load_state().unwrap(), HysteresisState::default());
    }
}
