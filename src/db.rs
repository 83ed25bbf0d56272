use crate::model::{AnomalyReason, AnomalyRecord, CleanTransaction};
use crate::transform::TransformOutput;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// One completed load, recorded in `etl_runs`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtlRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub raw_rows: i64,
    pub clean_rows: i64,
    pub dropped_rows: i64,
    pub anomaly_rows: i64,
}

impl EtlRun {
    pub fn new(output: &TransformOutput) -> Self {
        EtlRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            raw_rows: output.report.raw_rows as i64,
            clean_rows: output.clean.len() as i64,
            dropped_rows: output.report.dropped_rows() as i64,
            anomaly_rows: output.anomalies.len() as i64,
        }
    }
}

/// Open (creating parent directories) and initialise the warehouse
pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Clean transactions (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions_clean (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            txn_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            merchant TEXT NOT NULL,
            merchant_category TEXT,
            amount REAL NOT NULL,
            currency TEXT,
            timestamp TEXT NOT NULL,
            hour_of_day INTEGER NOT NULL CHECK (hour_of_day BETWEEN 0 AND 23),
            is_high_value INTEGER NOT NULL,
            loaded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Anomalies (append-only, one row per rule hit)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transaction_anomalies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            txn_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            reason TEXT NOT NULL
                CHECK (reason IN ('HIGH_VALUE', 'RAPID_REPEAT', 'NON_POSITIVE_AMOUNT')),
            timestamp TEXT NOT NULL,
            loaded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Run log (one row per load)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS etl_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            raw_rows INTEGER NOT NULL,
            clean_rows INTEGER NOT NULL,
            dropped_rows INTEGER NOT NULL,
            anomaly_rows INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_clean_account ON transactions_clean(account_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_clean_timestamp ON transactions_clean(timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_anomalies_reason ON transaction_anomalies(reason)",
        [],
    )?;

    Ok(())
}

/// Append one transform result. Both tables and the run row are written in
/// a single transaction; nothing is ever updated or deleted.
pub fn load(conn: &mut Connection, output: &TransformOutput) -> Result<EtlRun> {
    let run = EtlRun::new(output);
    let tx = conn.transaction()?;

    {
        let mut insert_clean = tx.prepare(
            "INSERT INTO transactions_clean (
                run_id, txn_id, account_id, merchant, merchant_category,
                amount, currency, timestamp, hour_of_day, is_high_value
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for clean in &output.clean {
            insert_clean.execute(params![
                run.run_id,
                clean.txn_id,
                clean.account_id,
                clean.merchant,
                clean.merchant_category,
                clean.amount,
                clean.currency,
                clean.timestamp.to_rfc3339(),
                clean.hour_of_day,
                clean.is_high_value,
            ])?;
        }

        let mut insert_anomaly = tx.prepare(
            "INSERT INTO transaction_anomalies (run_id, txn_id, account_id, reason, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for anomaly in &output.anomalies {
            insert_anomaly.execute(params![
                run.run_id,
                anomaly.txn_id,
                anomaly.account_id,
                anomaly.reason.as_str(),
                anomaly.timestamp.to_rfc3339(),
            ])?;
        }

        tx.execute(
            "INSERT INTO etl_runs (
                run_id, started_at, raw_rows, clean_rows, dropped_rows, anomaly_rows
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.run_id,
                run.started_at.to_rfc3339(),
                run.raw_rows,
                run.clean_rows,
                run.dropped_rows,
                run.anomaly_rows,
            ],
        )?;
    }

    tx.commit().context("Failed to commit load")?;

    info!(
        run_id = %run.run_id,
        clean = run.clean_rows,
        anomalies = run.anomaly_rows,
        "batch loaded"
    );
    Ok(run)
}

// ============================================================================
// READ SIDE
// ============================================================================

fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_reason(row: &Row, idx: usize) -> rusqlite::Result<AnomalyReason> {
    let raw: String = row.get(idx)?;
    raw.parse::<AnomalyReason>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub fn count_clean(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM transactions_clean", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_anomalies(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM transaction_anomalies", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_unique_accounts(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT account_id) FROM transactions_clean",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Anomaly counts per reason, most frequent first
pub fn anomalies_by_reason(conn: &Connection) -> Result<Vec<(AnomalyReason, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT reason, COUNT(*) AS n
         FROM transaction_anomalies
         GROUP BY reason
         ORDER BY n DESC, reason",
    )?;

    let counts = stmt
        .query_map([], |row| Ok((parse_reason(row, 0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(counts)
}

/// Most frequent merchant categories (null categories excluded)
pub fn top_categories(conn: &Connection, limit: usize) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT merchant_category, COUNT(*) AS n
         FROM transactions_clean
         WHERE merchant_category IS NOT NULL
         GROUP BY merchant_category
         ORDER BY n DESC, merchant_category
         LIMIT ?1",
    )?;

    let categories = stmt
        .query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

/// Transaction count per UTC hour; hours without traffic are absent
pub fn hourly_volume(conn: &Connection) -> Result<Vec<(u32, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT hour_of_day, COUNT(*)
         FROM transactions_clean
         GROUP BY hour_of_day
         ORDER BY hour_of_day",
    )?;

    let hours = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(hours)
}

/// Most recently loaded clean rows
pub fn recent_clean(conn: &Connection, limit: usize) -> Result<Vec<CleanTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT txn_id, account_id, merchant, merchant_category, amount,
                currency, timestamp, hour_of_day, is_high_value
         FROM transactions_clean
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let transactions = stmt
        .query_map([limit as i64], |row| {
            Ok(CleanTransaction {
                txn_id: row.get(0)?,
                account_id: row.get(1)?,
                merchant: row.get(2)?,
                merchant_category: row.get(3)?,
                amount: row.get(4)?,
                currency: row.get(5)?,
                timestamp: parse_ts(row, 6)?,
                hour_of_day: row.get(7)?,
                is_high_value: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

/// Most recently loaded anomalies
pub fn recent_anomalies(conn: &Connection, limit: usize) -> Result<Vec<AnomalyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT txn_id, account_id, reason, timestamp
         FROM transaction_anomalies
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let anomalies = stmt
        .query_map([limit as i64], |row| {
            Ok(AnomalyRecord {
                txn_id: row.get(0)?,
                account_id: row.get(1)?,
                reason: parse_reason(row, 2)?,
                timestamp: parse_ts(row, 3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(anomalies)
}

/// Run history, newest first
pub fn get_runs(conn: &Connection, limit: usize) -> Result<Vec<EtlRun>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, raw_rows, clean_rows, dropped_rows, anomaly_rows
         FROM etl_runs
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map([limit as i64], |row| {
            Ok(EtlRun {
                run_id: row.get(0)?,
                started_at: parse_ts(row, 1)?,
                raw_rows: row.get(2)?,
                clean_rows: row.get(3)?,
                dropped_rows: row.get(4)?,
                anomaly_rows: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

// ============================================================================
// DASHBOARD SNAPSHOT
// ============================================================================

/// Everything the dashboard shows, read in one go
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub clean_count: i64,
    pub anomaly_count: i64,
    pub unique_accounts: i64,
    pub anomalies_by_reason: Vec<(AnomalyReason, i64)>,
    pub top_categories: Vec<(String, i64)>,
    pub hourly_volume: Vec<(u32, i64)>,
    pub recent_clean: Vec<CleanTransaction>,
    pub recent_anomalies: Vec<AnomalyRecord>,
}

impl DashboardSnapshot {
    pub const TOP_CATEGORIES: usize = 10;

    pub fn load(conn: &Connection, preview_limit: usize) -> Result<Self> {
        Ok(DashboardSnapshot {
            clean_count: count_clean(conn)?,
            anomaly_count: count_anomalies(conn)?,
            unique_accounts: count_unique_accounts(conn)?,
            anomalies_by_reason: anomalies_by_reason(conn)?,
            top_categories: top_categories(conn, Self::TOP_CATEGORIES)?,
            hourly_volume: hourly_volume(conn)?,
            recent_clean: recent_clean(conn, preview_limit)?,
            recent_anomalies: recent_anomalies(conn, preview_limit)?,
        })
    }

    /// Count for every hour 0-23, zero-filled
    pub fn full_day_volume(&self) -> [i64; 24] {
        let mut hours = [0i64; 24];
        for &(hour, count) in &self.hourly_volume {
            if let Some(slot) = hours.get_mut(hour as usize) {
                *slot = count;
            }
        }
        hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawBatch, RawTransaction};
    use crate::transform::transform;

    fn raw(
        txn_id: &str,
        account_id: &str,
        merchant: &str,
        category: &str,
        amount: &str,
        timestamp: &str,
    ) -> RawTransaction {
        RawTransaction::new(txn_id, account_id, merchant, category, amount, "INR", timestamp)
    }

    fn sample_output() -> TransformOutput {
        let batch = RawBatch::from_transactions(vec![
            raw("t1", "a1", "Zomato", "Food", "10", "2024-01-01T00:00:00Z"),
            raw("t2", "a1", "Croma", "Electronics", "60000", "2024-01-01T00:00:10Z"),
            raw("t3", "a1", "Swiggy", "Food", "-5", "2024-01-01T00:00:20Z"),
            raw("t4", "a2", "HP", "", "300", "2024-01-01T13:15:00Z"),
            raw("t5", "a2", "HP", "Fuel", "bad", "2024-01-01T13:15:00Z"),
        ]);
        transform(&batch).unwrap()
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_load_appends_both_tables() {
        let mut conn = memory_db();
        let output = sample_output();

        let run = load(&mut conn, &output).unwrap();

        assert_eq!(run.raw_rows, 5);
        assert_eq!(run.clean_rows, 4);
        assert_eq!(run.dropped_rows, 1);
        assert_eq!(run.anomaly_rows, 3);
        assert_eq!(count_clean(&conn).unwrap(), 4);
        assert_eq!(count_anomalies(&conn).unwrap(), 3);
    }

    #[test]
    fn test_load_twice_never_dedups() {
        let mut conn = memory_db();
        let output = sample_output();

        let first = load(&mut conn, &output).unwrap();
        let second = load(&mut conn, &output).unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(count_clean(&conn).unwrap(), 8);
        assert_eq!(count_anomalies(&conn).unwrap(), 6);
        assert_eq!(get_runs(&conn, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_load_empty_output_records_run() {
        let mut conn = memory_db();
        let run = load(&mut conn, &TransformOutput::default()).unwrap();

        assert_eq!(run.clean_rows, 0);
        assert_eq!(count_clean(&conn).unwrap(), 0);
        assert_eq!(get_runs(&conn, 10).unwrap()[0].run_id, run.run_id);
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let mut conn = memory_db();
        let output = sample_output();
        load(&mut conn, &output).unwrap();

        let mut clean = recent_clean(&conn, 10).unwrap();
        clean.reverse();
        assert_eq!(clean, output.clean);

        let mut anomalies = recent_anomalies(&conn, 10).unwrap();
        anomalies.reverse();
        assert_eq!(anomalies, output.anomalies);
    }

    #[test]
    fn test_aggregates() {
        let mut conn = memory_db();
        load(&mut conn, &sample_output()).unwrap();

        assert_eq!(count_unique_accounts(&conn).unwrap(), 2);

        let reasons = anomalies_by_reason(&conn).unwrap();
        assert_eq!(reasons.len(), 3);
        assert!(reasons.iter().all(|(_, n)| *n == 1));

        let categories = top_categories(&conn, 10).unwrap();
        assert_eq!(
            categories,
            vec![("Food".to_string(), 2), ("Electronics".to_string(), 1)]
        );

        let hours = hourly_volume(&conn).unwrap();
        assert_eq!(hours, vec![(0, 3), (13, 1)]);
    }

    #[test]
    fn test_dashboard_snapshot() {
        let mut conn = memory_db();
        load(&mut conn, &sample_output()).unwrap();

        let snapshot = DashboardSnapshot::load(&conn, 2).unwrap();

        assert_eq!(snapshot.clean_count, 4);
        assert_eq!(snapshot.anomaly_count, 3);
        assert_eq!(snapshot.recent_clean.len(), 2);
        assert_eq!(snapshot.recent_anomalies.len(), 2);

        let day = snapshot.full_day_volume();
        assert_eq!(day[0], 3);
        assert_eq!(day[13], 1);
        assert_eq!(day.iter().sum::<i64>(), 4);
    }

    #[test]
    fn test_reason_check_constraint() {
        let conn = memory_db();
        let result = conn.execute(
            "INSERT INTO transaction_anomalies (run_id, txn_id, account_id, reason, timestamp)
             VALUES ('r', 't', 'a', 'BOGUS', '2024-01-01T00:00:00+00:00')",
            [],
        );
        assert!(result.is_err());
    }
}
