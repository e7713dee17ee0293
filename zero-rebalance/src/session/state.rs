//! SQLite state persistence for rebalance decisions.
//!
//! Two tables:
//! - `events`: append-only JSON payloads keyed by event type. The latest
//!   `regime_rebalance_state` event is the persisted hysteresis state.
//! - `executions`: broker fills, idempotent on execution id, queried for the
//!   last rebalance-tagged fill.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::data::ExecutionFill;
use crate::gates::HysteresisState;

/// Event type holding the persisted [`HysteresisState`].
pub const STATE_EVENT: &str = "regime_rebalance_state";

fn db_time(time: &DateTime<Utc>) -> String {
    // Fixed width so text ordering matches time ordering.
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in state store: {s}"))
}

/// SQLite state store
#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Open or create a state store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        info!(path = ?path, "State store opened");
        Ok(store)
    }

    /// Create an in-memory state store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        debug!("In-memory state store created");
        Ok(store)
    }

    pub(super) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("State store connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS executions (
                exec_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                order_ref TEXT,
                execution_time TEXT NOT NULL,
                shares REAL NOT NULL,
                price REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, id);
            CREATE INDEX IF NOT EXISTS idx_executions_time ON executions(execution_time);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ========================================================================
    // Event Operations
    // ========================================================================

    /// Append an event.
    pub fn record_event(&self, event_type: &str, payload: &serde_json::Value) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO events (event_type, payload, created_at) VALUES (?1, ?2, ?3)",
            params![event_type, payload.to_string(), db_time(&Utc::now())],
        )?;

        debug!(event_type, "Event recorded");
        Ok(())
    }

    /// Append several events in one transaction. Either all are stored or
    /// none are.
    pub fn record_events(&self, events: &[(&str, serde_json::Value)]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let created_at = db_time(&Utc::now());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (event_type, payload, created_at) VALUES (?1, ?2, ?3)",
            )?;
            for (event_type, payload) in events {
                stmt.execute(params![event_type, payload.to_string(), created_at])?;
            }
        }
        tx.commit()?;

        debug!(count = events.len(), "Events recorded");
        Ok(())
    }

    /// Payload of the most recent event of `event_type`.
    pub fn last_event_payload(&self, event_type: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn()?;

        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM events WHERE event_type = ?1 ORDER BY id DESC LIMIT 1",
                params![event_type],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .with_context(|| format!("Corrupt {event_type} payload in state store"))
            })
            .transpose()
    }

    /// Number of stored events of `event_type`.
    pub fn count_events(&self, event_type: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Hysteresis flags from the latest state event, default when none.
    pub fn load_hysteresis_state(&self) -> Result<HysteresisState> {
        match self.last_event_payload(STATE_EVENT)? {
            Some(payload) => serde_json::from_value(payload)
                .context("Failed to decode persisted hysteresis state"),
            None => Ok(HysteresisState::default()),
        }
    }

    /// Persist the hysteresis flags as a new state event.
    pub fn save_hysteresis_state(&self, state: &HysteresisState) -> Result<()> {
        self.record_event(STATE_EVENT, &serde_json::to_value(state)?)
    }

    // ========================================================================
    // Execution Operations
    // ========================================================================

    /// Store fills, ignoring execution ids already present. Returns the number
    /// of new rows.
    pub fn record_executions(&self, fills: &[ExecutionFill]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO executions
                    (exec_id, symbol, order_ref, execution_time, shares, price)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for fill in fills {
                inserted += stmt.execute(params![
                    fill.exec_id,
                    fill.symbol,
                    fill.order_ref,
                    db_time(&fill.time),
                    fill.shares,
                    fill.price,
                ])?;
            }
        }
        tx.commit()?;

        debug!(received = fills.len(), inserted, "Executions recorded");
        Ok(inserted)
    }

    /// Latest fill at or after `since` for one of `symbols` whose order
    /// reference starts with `order_ref_prefix`.
    pub fn last_rebalance_fill(
        &self,
        symbols: &[String],
        order_ref_prefix: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT symbol, execution_time FROM executions
            WHERE order_ref IS NOT NULL
              AND substr(order_ref, 1, length(?1)) = ?1
              AND execution_time >= ?2
            ORDER BY execution_time DESC
            "#,
        )?;
        let rows = stmt
            .query_map(params![order_ref_prefix, db_time(&since)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .find(|(symbol, _)| symbols.iter().any(|s| s == symbol))
            .map(|(_, time)| parse_db_time(&time))
            .transpose()
    }
}
