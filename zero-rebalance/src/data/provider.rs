//! Collaborator interfaces consumed by the decision core.
//!
//! Timeouts and transport concerns belong to the implementations; the core
//! awaits each call once and treats any error as fatal for the invocation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

use super::{ExecutionFill, PricePoint};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors reported by collaborators.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    Network(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Request exceeded the collaborator's deadline
    Timeout(String),
    /// Data not available for the requested symbol or range
    DataNotAvailable(String),
    /// Collaborator is temporarily unavailable
    Unavailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Internal collaborator error
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::Timeout(msg) => write!(f, "Timed out: {}", msg),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying on the next cycle)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Historical and live market data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Daily closes covering the last `calendar_days` calendar days.
    async fn fetch_history(
        &self,
        symbol: &str,
        calendar_days: u32,
    ) -> Result<Vec<PricePoint>, ProviderError>;

    /// Current price. The core rejects non-finite or non-positive values.
    async fn fetch_live_price(&self, symbol: &str) -> Result<f64, ProviderError>;
}

/// Broker execution history.
#[async_trait]
pub trait ExecutionHistory: Send + Sync {
    /// All executions at or after `since`.
    async fn fetch_executions(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionFill>, ProviderError>;
}

/// Exchange session calendar.
pub trait TradingCalendar: Send + Sync {
    /// Trading sessions of `exchange` in `[from, to]`, ascending.
    fn sessions(
        &self,
        exchange: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, ProviderError>;
}
