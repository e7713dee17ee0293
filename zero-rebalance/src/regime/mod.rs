//! Regime detection over the basket's daily history.
//!
//! ```text
//! fetch_aligned_history ──► AlignedHistory ──┬──► build_proxy_series ──► classify_regime
//!                                            └──► evaluate_ratio_gate
//! ```

pub mod classifier;
pub mod history;
pub mod proxy;
pub mod ratio;

pub use classifier::{classify_regime, RegimeMetrics};
pub use history::{align_history, fetch_aligned_history, history_calendar_days, AlignedHistory};
pub use proxy::build_proxy_series;
pub use ratio::{evaluate_ratio_gate, RatioGateMetrics};
