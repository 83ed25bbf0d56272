// 🧾 Record Model
// Raw (untrusted) input rows, cleaned transactions and anomaly records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COLUMN NAMES
// ============================================================================

pub const COL_TXN_ID: &str = "txn_id";
pub const COL_ACCOUNT_ID: &str = "account_id";
pub const COL_MERCHANT: &str = "merchant";
pub const COL_MERCHANT_CATEGORY: &str = "merchant_category";
pub const COL_AMOUNT: &str = "amount";
pub const COL_CURRENCY: &str = "currency";
pub const COL_TIMESTAMP: &str = "timestamp";

/// Input columns, in canonical order. All of them must be present in a
/// non-empty batch.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    COL_TXN_ID,
    COL_ACCOUNT_ID,
    COL_MERCHANT,
    COL_MERCHANT_CATEGORY,
    COL_AMOUNT,
    COL_CURRENCY,
    COL_TIMESTAMP,
];

/// Amounts strictly above this (face value) are high-value.
pub const HIGH_VALUE_THRESHOLD: f64 = 50_000.0;

// ============================================================================
// RAW INPUT
// ============================================================================

/// RawTransaction - one untrusted input row after column selection.
/// Every field is loose text; `None` means the cell was missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txn_id: Option<String>,
    pub account_id: Option<String>,
    pub merchant: Option<String>,
    pub merchant_category: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub timestamp: Option<String>,
}

impl RawTransaction {
    /// Create a row with every field present
    pub fn new(
        txn_id: &str,
        account_id: &str,
        merchant: &str,
        merchant_category: &str,
        amount: &str,
        currency: &str,
        timestamp: &str,
    ) -> Self {
        RawTransaction {
            txn_id: Some(txn_id.to_string()),
            account_id: Some(account_id.to_string()),
            merchant: Some(merchant.to_string()),
            merchant_category: Some(merchant_category.to_string()),
            amount: Some(amount.to_string()),
            currency: Some(currency.to_string()),
            timestamp: Some(timestamp.to_string()),
        }
    }

    /// Cells in `REQUIRED_COLUMNS` order
    pub fn into_cells(self) -> Vec<Option<String>> {
        vec![
            self.txn_id,
            self.account_id,
            self.merchant,
            self.merchant_category,
            self.amount,
            self.currency,
            self.timestamp,
        ]
    }
}

/// RawBatch - tabular input: ordered column names plus rows of optional cells.
///
/// Rows shorter than the header are padded with nulls when read; extra
/// columns are carried along and ignored by the validator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        RawBatch { columns, rows }
    }

    /// Empty batch with no columns at all (what a reader returns when there
    /// is nothing to read)
    pub fn empty() -> Self {
        RawBatch::default()
    }

    /// Build a batch with the canonical columns from typed rows
    pub fn from_transactions(transactions: Vec<RawTransaction>) -> Self {
        RawBatch {
            columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: transactions.into_iter().map(RawTransaction::into_cells).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append rows from another batch, aligning columns by name.
    /// Columns unknown so far are added at the end; cells missing in either
    /// side become null.
    pub fn extend(&mut self, other: RawBatch) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| match self.column_index(name) {
                Some(idx) => idx,
                None => {
                    self.columns.push(name.clone());
                    self.columns.len() - 1
                }
            })
            .collect();

        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, None);
        }

        for row in other.rows {
            let mut aligned = vec![None; width];
            for (cell, &target) in row.into_iter().zip(mapping.iter()) {
                aligned[target] = cell;
            }
            self.rows.push(aligned);
        }
    }
}

// ============================================================================
// CLEAN OUTPUT
// ============================================================================

/// CleanTransaction - a row that survived schema enforcement and coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanTransaction {
    pub txn_id: String,
    pub account_id: String,
    pub merchant: String,
    pub merchant_category: Option<String>,
    pub amount: f64,
    pub currency: Option<String>,
    pub timestamp: DateTime<Utc>,

    /// Hour (0-23) of the UTC timestamp
    pub hour_of_day: u32,

    /// amount > high-value threshold
    pub is_high_value: bool,
}

impl CleanTransaction {
    /// Whole seconds since the Unix epoch (floored)
    pub fn epoch_seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

// ============================================================================
// ANOMALIES
// ============================================================================

/// Why a transaction was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyReason {
    HighValue,
    RapidRepeat,
    NonPositiveAmount,
}

impl AnomalyReason {
    /// All reasons, in rule evaluation order
    pub const ALL: [AnomalyReason; 3] = [
        AnomalyReason::HighValue,
        AnomalyReason::RapidRepeat,
        AnomalyReason::NonPositiveAmount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyReason::HighValue => "HIGH_VALUE",
            AnomalyReason::RapidRepeat => "RAPID_REPEAT",
            AnomalyReason::NonPositiveAmount => "NON_POSITIVE_AMOUNT",
        }
    }
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnomalyReason::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown anomaly reason: {}", s))
    }
}

/// AnomalyRecord - one rule hit for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub txn_id: String,
    pub account_id: String,
    pub reason: AnomalyReason,
    pub timestamp: DateTime<Utc>,
}

impl AnomalyRecord {
    pub fn flag(tx: &CleanTransaction, reason: AnomalyReason) -> Self {
        AnomalyRecord {
            txn_id: tx.txn_id.clone(),
            account_id: tx.account_id.clone(),
            reason,
            timestamp: tx.timestamp,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
