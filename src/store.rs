//! Trade memory and parameter persistence
//!
//! SQLite-backed store for position records and the single current
//! parameter-set record. Schema is created at open; a store that cannot be
//! opened at startup is fatal, while per-cycle write failures are logged by
//! the caller and skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::optimizer::PerfStats;
use crate::params::ParameterSet;
use crate::{ExitReason, Side, Symbol, TradeRecord};

/// Name of the single parameter record
const PARAMS_RECORD: &str = "strategy_params";

pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = TradeStore { conn };
        store.create_tables()?;
        info!("trade store initialized: {}", db_path.display());
        Ok(store)
    }

    /// In-memory store for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = TradeStore { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                exit_reason TEXT,
                pnl REAL NOT NULL DEFAULT 0,
                rsi REAL NOT NULL,
                ema50 REAL NOT NULL,
                ema200 REAL NOT NULL,
                atr REAL NOT NULL,
                volume REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL NOT NULL,
                break_even INTEGER NOT NULL DEFAULT 0,
                trade_time TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_open
             ON trades(side) WHERE exit_price IS NULL",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS params (
                name TEXT PRIMARY KEY,
                json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        debug!("database schema created/verified");
        Ok(())
    }

    // =========================================================================
    // Trades
    // =========================================================================

    pub fn insert_trade(&self, trade: &TradeRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO trades
             (symbol, side, entry_price, exit_price, exit_reason, pnl,
              rsi, ema50, ema200, atr, volume, stop_loss, take_profit,
              break_even, trade_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                trade.symbol.as_str(),
                trade.side.as_str(),
                trade.entry_price,
                trade.exit_price,
                trade.exit_reason.map(|r| r.as_str()),
                trade.pnl,
                trade.rsi,
                trade.ema50,
                trade.ema200,
                trade.atr,
                trade.volume,
                trade.stop_loss,
                trade.take_profit,
                trade.break_even_activated as i64,
                trade.trade_time.to_rfc3339(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(
            "trade recorded: #{} {} {} @ {:.2} (SL {:.2}, TP {:.2})",
            id, trade.side, trade.symbol, trade.entry_price, trade.stop_loss, trade.take_profit
        );
        Ok(id)
    }

    /// Open positions, optionally filtered by direction.
    pub fn open_trades(&self, side: Option<Side>) -> Result<Vec<TradeRecord>> {
        let mut sql = String::from("SELECT * FROM trades WHERE exit_price IS NULL");
        if side.is_some() {
            sql.push_str(" AND side = ?1");
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match side {
            Some(s) => stmt.query_map(params![s.as_str()], row_to_trade)?,
            None => stmt.query_map([], row_to_trade)?,
        };

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn closed_trades(&self) -> Result<Vec<TradeRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM trades WHERE exit_price IS NOT NULL ORDER BY id")?;
        let rows = stmt.query_map([], row_to_trade)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Seal a position: set the exit fields exactly once.
    pub fn close_trade(
        &self,
        id: i64,
        exit_price: f64,
        reason: ExitReason,
        pnl: f64,
        break_even_activated: bool,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE trades
             SET exit_price = ?2, exit_reason = ?3, pnl = ?4, break_even = ?5
             WHERE id = ?1 AND exit_price IS NULL",
            params![
                id,
                exit_price,
                reason.as_str(),
                pnl,
                break_even_activated as i64
            ],
        )?;

        if updated == 0 {
            anyhow::bail!("trade #{id} not found or already closed");
        }

        info!(
            "trade #{} closed ({}): exit {:.2}, PnL {:+.4}%",
            id, reason, exit_price, pnl
        );
        Ok(())
    }

    /// Refresh the stored risk levels of an open position.
    pub fn update_levels(
        &self,
        id: i64,
        stop_loss: f64,
        take_profit: f64,
        break_even_activated: bool,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE trades SET stop_loss = ?2, take_profit = ?3, break_even = ?4
             WHERE id = ?1 AND exit_price IS NULL",
            params![id, stop_loss, take_profit, break_even_activated as i64],
        )?;
        Ok(())
    }

    /// Aggregate closed-trade performance for the optimizer.
    pub fn performance(&self) -> Result<PerfStats> {
        let row = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN pnl > 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(pnl), 0.0)
             FROM trades WHERE exit_price IS NOT NULL",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?;

        let (closed, winners, total_pnl) = row;
        if closed == 0 {
            return Ok(PerfStats::default());
        }

        Ok(PerfStats {
            closed_trades: closed as u32,
            win_rate: winners as f64 / closed as f64 * 100.0,
            avg_pnl: total_pnl / closed as f64,
        })
    }

    /// Closed-trade counts per exit reason, for the summary report.
    pub fn exit_reason_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT exit_reason, COUNT(*) FROM trades
             WHERE exit_reason IS NOT NULL GROUP BY exit_reason",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn total_trades(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?)
    }

    // =========================================================================
    // Parameter persistence
    // =========================================================================

    /// Load the current parameter set, if one has been persisted.
    /// Unknown or missing fields in the stored record are a hard error.
    pub fn load_params(&self) -> Result<Option<ParameterSet>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT json FROM params WHERE name = ?1",
                params![PARAMS_RECORD],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => {
                let parsed: ParameterSet = serde_json::from_str(&json)
                    .context("stored parameter record does not match the expected fields")?;
                parsed.validate()?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Replace the current parameter record atomically.
    pub fn save_params(&self, set: &ParameterSet) -> Result<()> {
        let json = serde_json::to_string(set)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO params (name, json, updated_at) VALUES (?1, ?2, ?3)",
            params![PARAMS_RECORD, json, Utc::now().to_rfc3339()],
        )?;
        debug!("parameter set persisted (mode: {})", set.mode);
        Ok(())
    }
}

fn row_to_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRecord> {
    // Corrupt columns surface as errors; a default here would hide damage
    let side_raw: String = row.get(2)?;
    let side = Side::parse(&side_raw)
        .ok_or_else(|| bad_column(2, format!("unknown side: {side_raw}")))?;

    let exit_reason = match row.get::<_, Option<String>>(5)? {
        Some(raw) => Some(
            ExitReason::parse(&raw)
                .ok_or_else(|| bad_column(5, format!("unknown exit reason: {raw}")))?,
        ),
        None => None,
    };

    let time_raw: String = row.get(15)?;
    let trade_time = time_raw
        .parse::<DateTime<Utc>>()
        .map_err(|err| bad_column(15, format!("bad trade_time {time_raw:?}: {err}")))?;

    Ok(TradeRecord {
        id: Some(row.get(0)?),
        symbol: Symbol::new(row.get::<_, String>(1)?),
        side,
        entry_price: row.get(3)?,
        exit_price: row.get(4)?,
        exit_reason,
        pnl: row.get(6)?,
        rsi: row.get(7)?,
        ema50: row.get(8)?,
        ema200: row.get(9)?,
        atr: row.get(10)?,
        volume: row.get(11)?,
        stop_loss: row.get(12)?,
        take_profit: row.get(13)?,
        break_even_activated: row.get::<_, i64>(14)? != 0,
        trade_time,
    })
}

fn bad_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}
