// STORAGE: persistent signal audit trail and cooldown registry (SQLite).
// Cooldowns survive restarts so a crash cannot double-alert a setup.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{Side, Signal, Timeframe};

pub struct SignalStorage {
    db: Arc<Mutex<Connection>>,
}

fn cooldown_key(symbol: &str, tf: Timeframe, side: Side, zone_key: &str) -> String {
    format!("{symbol}|{tf}|{}|{zone_key}", side.as_str())
}

impl SignalStorage {
    /// Open (or create) the database and initialise the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(path))?
        };
        init_schema(&conn)?;
        info!("STORAGE: database ready at {path}");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist an emitted signal with its full JSON payload.
    pub async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let payload = serde_json::to_string(signal).context("serialize signal payload")?;
        let breakdown = serde_json::to_string(&signal.breakdown).context("serialize breakdown")?;
        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT INTO signals (
                id, symbol, timeframe, side, score, breakdown,
                entry, sl, tp1, tp2, rr, zone_key, created_at, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                signal.id.to_string(),
                signal.symbol,
                signal.timeframe.as_str(),
                signal.side.as_str(),
                signal.score,
                breakdown,
                signal.levels.entry,
                signal.levels.stop_loss,
                signal.levels.take_profit1,
                signal.levels.take_profit2,
                signal.levels.risk_reward1,
                signal.setup.zone_key(),
                signal.timestamp.timestamp_millis(),
                payload,
            ],
        )?;
        Ok(())
    }

    pub async fn is_on_cooldown(
        &self,
        symbol: &str,
        tf: Timeframe,
        side: Side,
        zone_key: &str,
    ) -> Result<bool> {
        let key = cooldown_key(symbol, tf, side, zone_key);
        let now = Utc::now().timestamp_millis();
        let db = self.db.lock().await;
        let expires: Option<i64> = db
            .query_row(
                "SELECT expires_at FROM cooldowns WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(expires.map_or(false, |e| e > now))
    }

    /// Arm (or refresh) the cooldown for a setup key. At most one live row
    /// per key.
    pub async fn add_cooldown(
        &self,
        symbol: &str,
        tf: Timeframe,
        side: Side,
        zone_key: &str,
        minutes: i64,
    ) -> Result<()> {
        let key = cooldown_key(symbol, tf, side, zone_key);
        let now = Utc::now();
        let expires = now + Duration::minutes(minutes);
        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT INTO cooldowns (key, symbol, timeframe, side, zone_key, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at
            "#,
            params![
                key,
                symbol,
                tf.as_str(),
                side.as_str(),
                zone_key,
                expires.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Drop expired cooldown rows. Runs on the hourly maintenance tick.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp_millis();
        let db = self.db.lock().await;
        let removed = db.execute("DELETE FROM cooldowns WHERE expires_at <= ?1", params![now])?;
        if removed > 0 {
            debug!("STORAGE: removed {removed} expired cooldowns");
        }
        Ok(removed)
    }

    pub async fn signal_count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            side TEXT NOT NULL,
            score REAL NOT NULL,
            breakdown TEXT NOT NULL,
            entry REAL NOT NULL,
            sl REAL NOT NULL,
            tp1 REAL NOT NULL,
            tp2 REAL,
            rr REAL NOT NULL,
            zone_key TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS cooldowns (
            key TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            side TEXT NOT NULL,
            zone_key TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_signals_symbol_created ON signals(symbol, created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cooldowns_expires ON cooldowns(expires_at)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cooldown_round_trip_and_expiry() {
        let storage = SignalStorage::open(":memory:").unwrap();
        assert!(!storage
            .is_on_cooldown("BTCUSDT", Timeframe::H1, Side::Long, "support_100.00")
            .await
            .unwrap());

        storage
            .add_cooldown("BTCUSDT", Timeframe::H1, Side::Long, "support_100.00", 60)
            .await
            .unwrap();
        assert!(storage
            .is_on_cooldown("BTCUSDT", Timeframe::H1, Side::Long, "support_100.00")
            .await
            .unwrap());

        // a different zone key is a different identity
        assert!(!storage
            .is_on_cooldown("BTCUSDT", Timeframe::H1, Side::Long, "support_200.00")
            .await
            .unwrap());

        // expired entries stop gating and get cleaned up
        storage
            .add_cooldown("BTCUSDT", Timeframe::H1, Side::Short, "resistance_110.00", 0)
            .await
            .unwrap();
        assert!(!storage
            .is_on_cooldown("BTCUSDT", Timeframe::H1, Side::Short, "resistance_110.00")
            .await
            .unwrap());
        let removed = storage.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn rearming_updates_the_single_row() {
        let storage = SignalStorage::open(":memory:").unwrap();
        storage
            .add_cooldown("ETHUSDT", Timeframe::H4, Side::Long, "support_2000.00", 1)
            .await
            .unwrap();
        storage
            .add_cooldown("ETHUSDT", Timeframe::H4, Side::Long, "support_2000.00", 120)
            .await
            .unwrap();

        let db = storage.db.lock().await;
        let count: i64 = db
            .query_row("SELECT COUNT(*) FROM cooldowns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
