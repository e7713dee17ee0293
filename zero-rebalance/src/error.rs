//! Error types for the rebalance decision core.
//!
//! Every variant aborts the current invocation; no partial order list is
//! produced. Calendar failures are the exception: the cooldown gate degrades
//! to counting calendar days and only logs [`RebalanceError::CalendarUnavailable`].

use thiserror::Error;
use zero_common::validation::ValidationError;

use crate::data::ProviderError;

/// Decision core error.
#[derive(Debug, Error)]
pub enum RebalanceError {
    /// Too few aligned history points for the lookback window
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    /// NaN, non-finite or non-positive close or live price
    #[error("invalid price for {symbol}: {reason}")]
    InvalidPrice { symbol: String, reason: String },

    /// No common trading dates across the basket
    #[error("misaligned history: {0}")]
    MisalignedHistory(String),

    /// Configuration invariant violated (weights, ratio gate anchor, bands)
    #[error("config invariant violated: {0}")]
    ConfigInvariant(String),

    /// Trading calendar lookup failed
    #[error("trading calendar unavailable: {0}")]
    CalendarUnavailable(String),

    /// The rebalance base value is not positive
    #[error("invalid account state: {0}")]
    InvalidAccount(String),

    /// A collaborator fetch failed
    #[error("fetch failed for {symbol}: {source}")]
    Fetch {
        symbol: String,
        #[source]
        source: ProviderError,
    },
}

impl RebalanceError {
    pub(crate) fn invalid_price(symbol: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPrice {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the next scheduled cycle could plausibly succeed without a
    /// config change.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { source, .. } => source.is_recoverable(),
            Self::InsufficientHistory(_)
            | Self::MisalignedHistory(_)
            | Self::InvalidPrice { .. } => true,
            Self::CalendarUnavailable(_) => true,
            Self::ConfigInvariant(_) | Self::InvalidAccount(_) => false,
        }
    }
}

impl From<ValidationError> for RebalanceError {
    fn from(err: ValidationError) -> Self {
        Self::ConfigInvariant(err.to_string())
    }
}

/// Result alias for the decision core.
pub type Result<T> = std::result::Result<T, RebalanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_maps_to_config_invariant() {
        let err: RebalanceError =
            ValidationError::invalid("rebalance.hard_band", "must be >= soft_band").into();
        assert!(matches!(
            err,
            RebalanceError::ConfigInvariant(ref msg) if msg.contains("hard_band")
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_fetch_error_transience_follows_provider() {
        let err = RebalanceError::Fetch {
            symbol: "AAA".into(),
            source: ProviderError::RateLimited { retry_after_secs: Some(5) },
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("AAA"));

        let err = RebalanceError::Fetch {
            symbol: "AAA".into(),
            source: ProviderError::InvalidRequest("bad symbol".into()),
        };
        assert!(!err.is_transient());
    }
}
