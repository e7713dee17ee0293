//! Drift/band gate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which band the basket breaches. Any single symbol decides for the basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    #[default]
    None,
    Soft,
    Hard,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Soft => write!(f, "soft"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// Band evaluation for the whole basket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandVerdict {
    /// Largest relative drift across the basket
    pub max_drift: f64,
    pub soft_breach: bool,
    pub hard_breach: bool,
}

impl BandVerdict {
    pub fn band(&self) -> Band {
        if self.hard_breach {
            Band::Hard
        } else if self.soft_breach {
            Band::Soft
        } else {
            Band::None
        }
    }
}

/// `|current / target - 1|`. Callers guarantee `target_weight > 0`.
pub fn relative_drift(current_weight: f64, target_weight: f64) -> f64 {
    (current_weight / target_weight - 1.0).abs()
}

/// Classify the basket's drifts against the soft and hard bands.
pub fn evaluate_bands(
    drifts: impl IntoIterator<Item = f64>,
    soft_band: f64,
    hard_band: f64,
    eps: f64,
) -> BandVerdict {
    let max_drift = drifts.into_iter().fold(0.0_f64, f64::max);
    BandVerdict {
        max_drift,
        soft_breach: max_drift + eps >= soft_band,
        hard_breach: max_drift + eps >= hard_band,
    }
}
