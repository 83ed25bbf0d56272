// 🎲 Synthetic Transaction Generator
// Writes raw CSV drops shaped like a bank's transaction export

use crate::config::GeneratorConfig;
use crate::model::{RawTransaction, REQUIRED_COLUMNS};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Merchant categories and the merchants that belong to them
pub const CATEGORIES: [(&str, &[&str]); 6] = [
    ("Grocery", &["BigBazaar", "D-Mart", "FreshMart"]),
    ("Food", &["Zomato", "Swiggy", "Cafe Brew", "TacoTown"]),
    ("Fuel", &["HP", "BPCL", "IOCL"]),
    ("Bills", &["Amazon Pay", "PhonePe", "BharatBill"]),
    ("Electronics", &["Croma", "Reliance Digital", "UniTech"]),
    ("Travel", &["Uber", "Ola", "IRCTC"]),
];

pub const CURRENCY: &str = "INR";

/// Share of rows forced into the high-value range
const HIGH_VALUE_RATE: f64 = 0.02;

/// Share of rows forced to zero or negative
const NON_POSITIVE_RATE: f64 = 0.005;

const HISTORY_SECS: i64 = 7 * 24 * 3600;

pub struct TransactionGenerator {
    rng: StdRng,
    accounts: Vec<String>,
}

impl TransactionGenerator {
    pub fn new(seed: u64, accounts: usize) -> Self {
        TransactionGenerator {
            rng: StdRng::seed_from_u64(seed),
            accounts: (0..accounts.max(1)).map(|i| format!("ACCT{}", 100_000 + i)).collect(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.seed, config.accounts)
    }

    /// `rows` transactions spread over the week before `now`
    pub fn generate(&mut self, rows: usize, now: DateTime<Utc>) -> Vec<RawTransaction> {
        let batch_tag = now.format("%Y%m%d%H%M%S").to_string();
        let base_time = now - Duration::seconds(HISTORY_SECS);

        (0..rows)
            .map(|i| {
                let (category, merchants) = CATEGORIES[self.rng.gen_range(0..CATEGORIES.len())];
                let merchant = merchants.choose(&mut self.rng).copied().unwrap_or("Unknown");
                let account = self.accounts.choose(&mut self.rng).cloned().unwrap_or_default();
                let amount = self.amount();
                let ts = base_time + Duration::seconds(self.rng.gen_range(0..=HISTORY_SECS));

                RawTransaction::new(
                    &format!("TXN{}{:06}", batch_tag, i),
                    &account,
                    merchant,
                    category,
                    &format!("{:.2}", amount),
                    CURRENCY,
                    &ts.to_rfc3339(),
                )
            })
            .collect()
    }

    fn amount(&mut self) -> f64 {
        let mut amount = self.rng.gen_range(1.0..5_000.0);
        if self.rng.gen_bool(HIGH_VALUE_RATE) {
            amount = self.rng.gen_range(50_000.0..150_000.0);
        }
        if self.rng.gen_bool(NON_POSITIVE_RATE) {
            amount = self.rng.gen_range(-500.0..=0.0);
        }
        (amount * 100.0_f64).round() / 100.0
    }
}

/// Write rows as a CSV drop file with the canonical header
pub fn write_csv(path: &Path, rows: &[RawTransaction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;

    writer.write_record(REQUIRED_COLUMNS)?;
    for row in rows {
        let cells: Vec<String> = row
            .clone()
            .into_cells()
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        writer.write_record(&cells)?;
    }
    writer.flush()?;
    Ok(())
}

/// Generate `config.rows` rows into a new timestamped file under `out_dir`
pub fn generate(config: &GeneratorConfig, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let now = Utc::now();
    let filename = out_dir.join(format!("transactions_{}.csv", now.format("%Y%m%d_%H%M%S_%3f")));

    let mut generator = TransactionGenerator::from_config(config);
    let rows = generator.generate(config.rows, now);
    write_csv(&filename, &rows)?;

    info!(rows = rows.len(), file = %filename.display(), "raw transactions written");
    Ok(filename)
}
