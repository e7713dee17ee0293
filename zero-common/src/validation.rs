//! Configuration validation.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{AccountConfig, Config, DatabaseConfig, ObservabilityConfig, SymbolConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Shorthand for an [`ValidationError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Fold collected errors into a single result.
pub fn collect_errors(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.database.validate() {
            errors.push(e);
        }
        if let Err(e) = self.account.validate() {
            errors.push(e);
        }
        for (symbol, cfg) in &self.symbols {
            if let Err(e) = validate_symbol(symbol, cfg) {
                errors.push(e);
            }
        }
        if let Err(e) = self.check_basket_symbols() {
            errors.push(e);
        }

        collect_errors(errors)
    }

    /// Every basket symbol must have an entry in the symbol table.
    fn check_basket_symbols(&self) -> ValidationResult<()> {
        let Some(symbols) = self.rebalance.as_ref().and_then(|r| r.symbols.as_ref()) else {
            return Ok(());
        };

        let missing: Vec<&str> = symbols
            .iter()
            .filter(|s| !self.symbols.contains_key(s.as_str()))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Conflict {
                reason: format!(
                    "rebalance.symbols references unknown symbols: {}",
                    missing.join(", ")
                ),
            })
        }
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "database.path".into(),
            });
        }
        Ok(())
    }
}

impl Validate for AccountConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.margin_usage.is_finite() && self.margin_usage > 0.0) {
            return Err(ValidationError::invalid(
                "account.margin_usage",
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

fn validate_symbol(symbol: &str, cfg: &SymbolConfig) -> ValidationResult<()> {
    if !(cfg.weight.is_finite() && cfg.weight >= 0.0) {
        return Err(ValidationError::invalid(
            format!("symbols.{symbol}.weight"),
            "must be a non-negative number",
        ));
    }

    if cfg.buy_only_rebalancing == Some(true) && cfg.sell_only_rebalancing == Some(true) {
        return Err(ValidationError::Conflict {
            reason: format!("symbols.{symbol} cannot be both buy-only and sell-only"),
        });
    }

    let amounts = [
        ("buy_only_min_threshold_amount", cfg.buy_only_min_threshold_amount),
        ("buy_only_min_threshold_percent", cfg.buy_only_min_threshold_percent),
        ("sell_only_min_threshold_amount", cfg.sell_only_min_threshold_amount),
        ("sell_only_min_threshold_percent", cfg.sell_only_min_threshold_percent),
    ];
    for (field, value) in amounts {
        if let Some(v) = value {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ValidationError::invalid(
                    format!("symbols.{symbol}.{field}"),
                    "must be a non-negative number",
                ));
            }
        }
    }

    if let Some(overrides) = &cfg.rebalance {
        if let Some(mode) = &overrides.mode {
            if !["buy", "sell", "both"].contains(&mode.to_lowercase().as_str()) {
                return Err(ValidationError::invalid(
                    format!("symbols.{symbol}.rebalance.mode"),
                    "must be one of: buy, sell, both",
                ));
            }
        }
        let fractions = [
            ("min_threshold_amount", overrides.min_threshold_amount),
            ("min_threshold_percent", overrides.min_threshold_percent),
            ("min_threshold_percent_relative", overrides.min_threshold_percent_relative),
        ];
        for (field, value) in fractions {
            if let Some(v) = value {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(ValidationError::invalid(
                        format!("symbols.{symbol}.rebalance.{field}"),
                        "must be a non-negative number",
                    ));
                }
            }
        }
    }

    Ok(())
}
