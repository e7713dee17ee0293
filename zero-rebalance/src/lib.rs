//! Zero Rebalance Library
//!
//! Regime-aware basket rebalancing. Once per invocation the engine decides
//! whether and how much of each basket symbol to buy or sell.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        zero-rebalance                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  History +      │  │  Gates          │  │  Allocation +   │     │
//! │  │  Regime         │─▶│  band, cooldown │─▶│  Threshold      │     │
//! │  │  (proxy, ratio) │  │  flow/deficit   │  │  Filter         │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! │           ▲                                         │               │
//! │  MarketDataProvider                     orders + decision record    │
//! │  ExecutionHistory                       StateStore (SQLite)         │
//! │  TradingCalendar                                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Bands
//! - **Soft**: any symbol drifts past `soft_band`; trades only when the regime
//!   is choppy, the cooldown has elapsed and the ratio gate allows it
//! - **Hard**: any symbol drifts past `hard_band`; trades regardless
//!
//! ## Rails
//! - **Deficit**: invested value exceeds the base; sells to raise cash
//! - **Flow**: spare or missing cash is spread along the share gaps
//!
//! Both rails use separate enter and exit thresholds. The active flags are the
//! only state carried between invocations.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod gates;
pub mod portfolio;
pub mod regime;
pub mod session;

pub use config::{RegimeRebalanceConfig, SymbolPolicy};
pub use engine::{
    GateVerdict, RebalanceDecision, RebalanceMode, RebalanceOrder, RegimeRebalanceEngine,
};
pub use error::{RebalanceError, Result};
pub use session::{RebalanceSession, SessionOutcome, StateStore};
