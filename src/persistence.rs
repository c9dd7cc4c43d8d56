//! Document-store persistence: a single upserted settings row and an
//! append-only signal log, backed by SQLite in WAL mode (§10.2). Write
//! failures are logged and swallowed at the call site — a failed append
//! never blocks live signal generation (§7 persistence error policy).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::error;

use crate::models::{DataSource, Settings, SignalWeights, TradingSignal};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS settings (
    id TEXT PRIMARY KEY,
    document_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS signals (
    id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    document_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signals_symbol_time
    ON signals(symbol, timestamp DESC);
"#;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .with_context(|| format!("opening sqlite database at {database_path}"))?;
        conn.execute_batch(SCHEMA_SQL).context("applying persistence schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite database")?;
        conn.execute_batch(SCHEMA_SQL).context("applying persistence schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Upserts the single settings document. Writing the same document
    /// twice leaves exactly one row (idempotent per §8).
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let document_json = serde_json::to_string(settings).context("serializing settings")?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (id, document_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET document_json = excluded.document_json, updated_at = excluded.updated_at",
            params![settings.id, document_json, settings.updated_at.to_rfc3339()],
        )
        .context("upserting settings document")?;
        Ok(())
    }

    pub fn load_settings(&self, id: &str) -> Result<Option<Settings>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT document_json FROM settings WHERE id = ?1")
            .context("preparing settings lookup")?;
        let mut rows = stmt.query(params![id]).context("querying settings")?;
        match rows.next().context("reading settings row")? {
            Some(row) => {
                let json: String = row.get(0)?;
                let settings: Settings = serde_json::from_str(&json).context("deserializing settings")?;
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Appends a signal to the log. Logs and swallows failures, matching
    /// the persistence error policy: a failed append never blocks the
    /// live query path.
    pub fn append_signal(&self, signal: &TradingSignal) {
        if let Err(e) = self.try_append_signal(signal) {
            error!(error = %e, signal_id = %signal.id, "failed to persist trading signal");
        }
    }

    fn try_append_signal(&self, signal: &TradingSignal) -> Result<()> {
        let document_json = serde_json::to_string(signal).context("serializing signal")?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO signals (id, symbol, timestamp, document_json) VALUES (?1, ?2, ?3, ?4)",
            params![signal.id, signal.symbol, signal.timestamp.to_rfc3339(), document_json],
        )
        .context("appending signal")?;
        Ok(())
    }

    /// Most recent `limit` signals for `symbol`, newest first.
    pub fn recent_signals(&self, symbol: &str, limit: usize) -> Result<Vec<TradingSignal>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT document_json FROM signals WHERE symbol = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )
            .context("preparing signal history query")?;
        let rows = stmt
            .query_map(params![symbol, limit as i64], |row| row.get::<_, String>(0))
            .context("querying signal history")?;

        let mut out = Vec::new();
        for row in rows {
            let json = row.context("reading signal row")?;
            let signal: TradingSignal = serde_json::from_str(&json).context("deserializing signal")?;
            out.push(signal);
        }
        Ok(out)
    }
}

pub fn default_settings(symbol: &str, source: DataSource, weights: SignalWeights, now: DateTime<Utc>) -> Settings {
    Settings {
        id: "default".to_string(),
        active_symbol: symbol.to_string(),
        active_data_source: source,
        signal_weights: weights,
        updated_at: now,
        ..Settings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalType;

    fn signal(symbol: &str) -> TradingSignal {
        TradingSignal {
            id: TradingSignal::new_id(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            signal_type: SignalType::NoTrade,
            hfss_score: 0.0,
            probability_buy: 0.2,
            probability_sell: 0.2,
            probability_no_trade: 0.6,
            confidence: 0.6,
            breakdown: Default::default(),
            reason: "no significant order-flow signal".to_string(),
            price_at_signal: 100.0,
            ai_analysis: String::new(),
            ai_validated: false,
        }
    }

    #[test]
    fn settings_upsert_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let settings = default_settings("BTCUSDT", DataSource::Simulated, SignalWeights::default(), Utc::now());
        store.save_settings(&settings).unwrap();
        store.save_settings(&settings).unwrap();

        let conn = store.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM settings", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
        drop(conn);

        let loaded = store.load_settings("default").unwrap().unwrap();
        assert_eq!(loaded.active_symbol, "BTCUSDT");
    }

    #[test]
    fn signal_log_is_append_only_and_ordered() {
        let store = Store::in_memory().unwrap();
        for _ in 0..5 {
            store.append_signal(&signal("BTCUSDT"));
        }
        let recent = store.recent_signals("BTCUSDT", 3).unwrap();
        assert_eq!(recent.len(), 3);
    }

    #[test]
    fn missing_settings_returns_none() {
        let store = Store::in_memory().unwrap();
        assert!(store.load_settings("default").unwrap().is_none());
    }
}
