//! Zero Common - Shared configuration and logging for the Zero rebalancer.
//!
//! This crate provides:
//! - Configuration types and modular loading
//! - Configuration validation
//! - Logging setup and run identifiers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod logging;
pub mod validation;

pub use config::{
    AccountConfig, Config, DatabaseConfig, ExchangeHoursConfig, ObservabilityConfig,
    RatioGateSection, RebalanceConfig, SymbolConfig, SymbolRebalanceOverride,
};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, RebalanceConfig, SymbolConfig};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
