// 📐 Shape Layer - Schema Validation & Cleaning
// Enforces the input columns, coerces types and drops unusable rows

use crate::error::TransformError;
use crate::model::{
    CleanTransaction, RawBatch, RawTransaction, COL_ACCOUNT_ID, COL_AMOUNT, COL_CURRENCY,
    COL_MERCHANT, COL_MERCHANT_CATEGORY, COL_TIMESTAMP, COL_TXN_ID, HIGH_VALUE_THRESHOLD,
    REQUIRED_COLUMNS,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, warn};

// ============================================================================
// DROP REPORTING
// ============================================================================

/// Why a row was excluded from the clean output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    MissingTxnId,
    MissingAccountId,
    MissingMerchant,
    /// Amount missing or not a finite number
    InvalidAmount,
    /// Timestamp missing or not ISO-8601
    InvalidTimestamp,
}

/// A rejected input row (`row` is its 0-based position in the batch)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub txn_id: Option<String>,
    pub reasons: Vec<DropReason>,
}

/// Result of cleaning: every input row ends up in exactly one of the two lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanOutcome {
    pub clean: Vec<CleanTransaction>,
    pub dropped: Vec<DroppedRow>,
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator {
    high_value_threshold: f64,
}

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator::with_threshold(HIGH_VALUE_THRESHOLD)
    }

    pub fn with_threshold(high_value_threshold: f64) -> Self {
        SchemaValidator {
            high_value_threshold,
        }
    }

    /// Fail with every required column the batch lacks
    pub fn check_columns(&self, batch: &RawBatch) -> Result<(), TransformError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| batch.column_index(col).is_none())
            .map(|col| col.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TransformError::MalformedInput { missing })
        }
    }

    /// Project the batch onto the required columns. Other columns are dropped.
    pub fn select(&self, batch: &RawBatch) -> Result<Vec<RawTransaction>, TransformError> {
        self.check_columns(batch)?;

        let index = |name: &str| batch.column_index(name).unwrap_or(usize::MAX);
        let (i_txn, i_acct, i_merch, i_cat, i_amt, i_cur, i_ts) = (
            index(COL_TXN_ID),
            index(COL_ACCOUNT_ID),
            index(COL_MERCHANT),
            index(COL_MERCHANT_CATEGORY),
            index(COL_AMOUNT),
            index(COL_CURRENCY),
            index(COL_TIMESTAMP),
        );

        let cell = |row: &[Option<String>], i: usize| row.get(i).cloned().flatten();

        Ok(batch
            .rows()
            .iter()
            .map(|row| RawTransaction {
                txn_id: cell(row, i_txn),
                account_id: cell(row, i_acct),
                merchant: cell(row, i_merch),
                merchant_category: cell(row, i_cat),
                amount: cell(row, i_amt),
                currency: cell(row, i_cur),
                timestamp: cell(row, i_ts),
            })
            .collect())
    }

    /// Coerce one row. Never fails: bad values turn into drop reasons.
    pub fn clean_row(&self, raw: &RawTransaction) -> Result<CleanTransaction, Vec<DropReason>> {
        let txn_id = non_null(&raw.txn_id);
        let account_id = non_null(&raw.account_id);
        let merchant = non_null(&raw.merchant);
        let amount = raw.amount.as_deref().and_then(parse_amount);
        let timestamp = raw.timestamp.as_deref().and_then(parse_timestamp);

        match (txn_id, account_id, merchant, amount, timestamp) {
            (Some(txn_id), Some(account_id), Some(merchant), Some(amount), Some(timestamp)) => {
                Ok(CleanTransaction {
                    txn_id,
                    account_id,
                    merchant,
                    merchant_category: non_null(&raw.merchant_category),
                    amount,
                    currency: non_null(&raw.currency),
                    timestamp,
                    hour_of_day: timestamp.hour(),
                    is_high_value: amount > self.high_value_threshold,
                })
            }
            (txn_id, account_id, merchant, amount, timestamp) => {
                let mut reasons = Vec::new();
                if txn_id.is_none() {
                    reasons.push(DropReason::MissingTxnId);
                }
                if account_id.is_none() {
                    reasons.push(DropReason::MissingAccountId);
                }
                if merchant.is_none() {
                    reasons.push(DropReason::MissingMerchant);
                }
                if amount.is_none() {
                    reasons.push(DropReason::InvalidAmount);
                }
                if timestamp.is_none() {
                    reasons.push(DropReason::InvalidTimestamp);
                }
                Err(reasons)
            }
        }
    }

    /// Clean a sequence of rows, keeping input order
    pub fn clean(&self, rows: &[RawTransaction]) -> CleanOutcome {
        let mut outcome = CleanOutcome::default();

        for (row, raw) in rows.iter().enumerate() {
            match self.clean_row(raw) {
                Ok(tx) => outcome.clean.push(tx),
                Err(reasons) => {
                    debug!(row, txn_id = ?raw.txn_id, ?reasons, "dropping row");
                    outcome.dropped.push(DroppedRow {
                        row,
                        txn_id: non_null(&raw.txn_id),
                        reasons,
                    });
                }
            }
        }

        if !outcome.dropped.is_empty() {
            warn!(
                dropped = outcome.dropped.len(),
                total = rows.len(),
                "rows failed validation and were excluded"
            );
        }

        outcome
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// COERCION
// ============================================================================

/// Blank text counts as null
fn non_null(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numeric parse; `None` on anything that isn't a finite number.
///
/// `"inf"`, `"infinity"` and `"NaN"` parse as floats but are rejected here,
/// so such rows drop as `InvalidAmount` instead of reaching HIGH_VALUE.
pub fn parse_amount(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// ISO-8601 parse into UTC; `None` if no accepted layout matches.
/// Naive date-times and bare dates are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // Offset-carrying layouts RFC 3339 rejects (space separator, +0530)
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ============================================================================
// TESTS
// ============================================================================
