//! Weekday trading calendar.
//!
//! Treats Monday through Friday as sessions, minus an explicit holiday list.
//! Exchanges outside the configured set are reported as unavailable so the
//! cooldown gate falls back to calendar days.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashSet};

use super::provider::{ProviderError, TradingCalendar};

/// Weekday session calendar for a set of exchanges.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    exchanges: HashSet<String>,
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    /// Calendar covering the given exchange codes.
    pub fn new<I, S>(exchanges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exchanges: exchanges.into_iter().map(|e| e.into().to_uppercase()).collect(),
            holidays: BTreeSet::new(),
        }
    }

    /// US cash equity venues.
    pub fn us_equities() -> Self {
        Self::new(["XNYS", "XNAS", "XASE", "ARCX", "BATS"])
    }

    /// Exclude the given dates from the session list.
    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn sessions(
        &self,
        exchange: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, ProviderError> {
        if !self.exchanges.contains(&exchange.to_uppercase()) {
            return Err(ProviderError::DataNotAvailable(format!(
                "no calendar for exchange {exchange}"
            )));
        }
        if from > to {
            return Ok(Vec::new());
        }

        Ok(from
            .iter_days()
            .take_while(|d| *d <= to)
            .filter(|d| self.is_session(*d))
            .collect())
    }
}
