//! Cooldown gate.
//!
//! Requires `cooldown_days` exchange sessions strictly after the date of the
//! last rebalance fill, up to and including today. When the calendar cannot
//! answer, elapsed calendar days are used instead and the result is marked
//! degraded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::TradingCalendar;
use crate::error::RebalanceError;

/// Cooldown evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownOutcome {
    /// Cooldown satisfied
    pub ok: bool,
    /// Sessions (or calendar days when degraded) since the last fill
    pub elapsed: Option<i64>,
    /// Calendar lookup failed and calendar days were counted
    pub degraded: bool,
}

impl CooldownOutcome {
    fn satisfied() -> Self {
        Self {
            ok: true,
            elapsed: None,
            degraded: false,
        }
    }
}

/// Evaluate the cooldown since `last_fill`.
pub fn evaluate_cooldown(
    last_fill: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_days: i64,
    calendar: &dyn TradingCalendar,
    exchange: &str,
) -> CooldownOutcome {
    let Some(last_fill) = last_fill else {
        return CooldownOutcome::satisfied();
    };
    if cooldown_days <= 0 {
        return CooldownOutcome::satisfied();
    }
    if last_fill >= now {
        return CooldownOutcome {
            ok: false,
            elapsed: Some(0),
            degraded: false,
        };
    }

    let start = last_fill.date_naive();
    let end = now.date_naive();

    let sessions = calendar
        .sessions(exchange, start, end)
        .map_err(|e| RebalanceError::CalendarUnavailable(format!("{exchange}: {e}")))
        .and_then(|sessions| {
            if sessions.is_empty() {
                Err(RebalanceError::CalendarUnavailable(format!(
                    "{exchange}: no sessions between {start} and {end}"
                )))
            } else {
                Ok(sessions)
            }
        });

    match sessions {
        Ok(sessions) => {
            let elapsed = sessions.iter().filter(|d| **d > start).count() as i64;
            CooldownOutcome {
                ok: elapsed >= cooldown_days,
                elapsed: Some(elapsed),
                degraded: false,
            }
        }
        Err(e) => {
            warn!(error = %e, "Cooldown calculation degraded; using calendar days");
            let elapsed = (end - start).num_days();
            CooldownOutcome {
                ok: elapsed >= cooldown_days,
                elapsed: Some(elapsed),
                degraded: true,
            }
        }
    }
}
