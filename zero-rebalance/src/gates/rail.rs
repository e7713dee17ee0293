//! Flow/deficit hysteresis rails.
//!
//! ```text
//!   deficit (cash < 0)                     flow (cash > 0 or small deficit)
//!   enter: |cash| >= start                 enter: |cash| >= flow_min
//!   stay:  active && |cash| >= stop        stay:  active && |cash| >= flow_stop
//! ```
//!
//! The active flags are the only state carried between invocations. They are
//! passed in as [`HysteresisState`] and the next state is returned; storage
//! belongs to the caller.

use serde::{Deserialize, Serialize};

/// Rail flags persisted across invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HysteresisState {
    #[serde(default)]
    pub flow_active: bool,
    #[serde(default)]
    pub deficit_active: bool,
}

/// Rail thresholds in account currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailThresholds {
    pub flow_min: f64,
    pub flow_stop: f64,
    pub deficit_start: f64,
    pub deficit_stop: f64,
}

impl RailThresholds {
    /// Scale fractional thresholds by the rebalance base value.
    pub fn from_fractions(
        total_value: f64,
        flow_trade_min: f64,
        flow_trade_stop: f64,
        deficit_rail_start: f64,
        deficit_rail_stop: f64,
    ) -> Self {
        Self {
            flow_min: flow_trade_min * total_value,
            flow_stop: flow_trade_stop * total_value,
            deficit_start: deficit_rail_start * total_value,
            deficit_stop: deficit_rail_stop * total_value,
        }
    }

    /// Deficit gate for a given deficit amount (positive = cash short).
    pub fn deficit_gate(&self, deficit: f64, deficit_active: bool) -> bool {
        deficit >= self.deficit_start || (deficit_active && deficit >= self.deficit_stop)
    }

    fn flow_gate(&self, amount: f64, flow_active: bool) -> bool {
        amount >= self.flow_min || (flow_active && amount >= self.flow_stop)
    }
}

/// Rail evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailVerdict {
    /// `total_value - invested_value`
    pub excess_cash: f64,
    pub flow_gate: bool,
    pub deficit_gate: bool,
}

/// Evaluate both rails against the prior state.
///
/// Flow is only considered when the deficit rail is not gating.
pub fn evaluate_rails(
    excess_cash: f64,
    thresholds: &RailThresholds,
    prior: HysteresisState,
) -> RailVerdict {
    let (flow_gate, deficit_gate) = if excess_cash < 0.0 {
        let deficit = -excess_cash;
        let deficit_gate = thresholds.deficit_gate(deficit, prior.deficit_active);
        let flow_gate = !deficit_gate && thresholds.flow_gate(deficit, prior.flow_active);
        (flow_gate, deficit_gate)
    } else {
        (thresholds.flow_gate(excess_cash, prior.flow_active), false)
    };

    RailVerdict {
        excess_cash,
        flow_gate,
        deficit_gate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> RailThresholds {
        // base 1000: flow 100/50, deficit 300/100
        RailThresholds::from_fractions(1000.0, 0.1, 0.05, 0.3, 0.1)
    }

    #[test]
    fn test_from_fractions() {
        let t = thresholds();
        assert!((t.flow_min - 100.0).abs() < 1e-9);
        assert!((t.deficit_stop - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_inside_bands() {
        let v = evaluate_rails(20.0, &thresholds(), HysteresisState::default());
        assert!(!v.flow_gate && !v.deficit_gate);
    }

    #[test]
    fn test_flow_enters_and_holds_to_stop() {
        let t = thresholds();
        assert!(evaluate_rails(150.0, &t, HysteresisState::default()).flow_gate);

        let idle = HysteresisState::default();
        let active = HysteresisState {
            flow_active: true,
            ..Default::default()
        };
        assert!(!evaluate_rails(75.0, &t, idle).flow_gate);
        assert!(evaluate_rails(75.0, &t, active).flow_gate);
        assert!(!evaluate_rails(40.0, &t, active).flow_gate);
    }

    #[test]
    fn test_deficit_enters_and_holds_to_stop() {
        let t = thresholds();
        let v = evaluate_rails(-500.0, &t, HysteresisState::default());
        assert!(v.deficit_gate);
        assert!(!v.flow_gate);

        let active = HysteresisState {
            deficit_active: true,
            ..Default::default()
        };
        assert!(evaluate_rails(-200.0, &t, active).deficit_gate);
        assert!(!evaluate_rails(-200.0, &t, HysteresisState::default()).deficit_gate);
    }

    #[test]
    fn test_small_deficit_falls_to_flow() {
        let v = evaluate_rails(-200.0, &thresholds(), HysteresisState::default());
        assert!(!v.deficit_gate);
        assert!(v.flow_gate);
    }
}
