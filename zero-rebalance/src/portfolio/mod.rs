//! Share allocation and per-symbol trade filtering.

pub mod allocation;
pub mod threshold;

pub use allocation::{merge_deltas, Holding, ShareAllocator, ShareDeltas};
pub use threshold::{filter_trade, FilteredTrade, TradeAction, TradeContext};
