//! Trading gates evaluated on every invocation.
//!
//! - [`band`]: drift against target weights, soft and hard bands
//! - [`cooldown`]: trading sessions since the last rebalance fill
//! - [`rail`]: flow/deficit cash rails with hysteresis

pub mod band;
pub mod cooldown;
pub mod rail;

pub use band::{evaluate_bands, relative_drift, Band, BandVerdict};
pub use cooldown::{evaluate_cooldown, CooldownOutcome};
pub use rail::{evaluate_rails, HysteresisState, RailThresholds, RailVerdict};
