// 📂 Raw Ingestion
// Reads the raw CSV drop directory into a single RawBatch

use crate::model::RawBatch;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read one CSV file. Headers are kept verbatim; empty cells become null.
pub fn read_csv_file(file_path: &Path) -> Result<RawBatch> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string();

    let columns: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header in {}", filename))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, filename)
        })?;

        let mut row: Vec<Option<String>> = record
            .iter()
            .take(columns.len())
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        row.resize(columns.len(), None);
        rows.push(row);
    }

    debug!(file = %filename, rows = rows.len(), "read raw file");
    Ok(RawBatch::new(columns, rows))
}

/// All `*.csv` files in `dir`, sorted by name
pub fn list_raw_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list raw directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Concatenate every raw file into one batch (column union, first-seen order).
/// No files gives an empty batch.
pub fn read_raw(dir: &Path) -> Result<RawBatch> {
    let files = list_raw_files(dir)?;

    if files.is_empty() {
        warn!(dir = %dir.display(), "no raw files found; run `banking-etl generate` first");
        return Ok(RawBatch::empty());
    }

    let mut batch = RawBatch::empty();
    for file in &files {
        batch.extend(read_csv_file(file)?);
    }

    info!(files = files.len(), rows = batch.len(), "raw files loaded");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_csv_file_nulls_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        fs::write(
            &path,
            "txn_id,account_id,merchant,merchant_category,amount,currency,timestamp\n\
             t1,a1,Zomato,,10,INR,2024-01-01T00:00:00Z\n",
        )
        .unwrap();

        let batch = read_csv_file(&path).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.columns().len(), 7);
        assert_eq!(batch.rows()[0][3], None);
        assert_eq!(batch.rows()[0][4].as_deref(), Some("10"));
    }

    #[test]
    fn test_read_csv_file_pads_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, "txn_id,amount,timestamp\nt1,10\n").unwrap();

        let batch = read_csv_file(&path).unwrap();
        assert_eq!(batch.rows()[0], vec![Some("t1".to_string()), Some("10".to_string()), None]);
    }

    #[test]
    fn test_read_raw_concatenates_sorted_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "txn_id,amount\nt2,20\n").unwrap();
        fs::write(dir.path().join("a.csv"), "txn_id,amount,extra\nt1,10,x\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let batch = read_raw(dir.path()).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.columns(), &["txn_id", "amount", "extra"]);
        assert_eq!(batch.rows()[0][0].as_deref(), Some("t1"));
        assert_eq!(batch.rows()[1][0].as_deref(), Some("t2"));
        assert_eq!(batch.rows()[1][2], None);
    }

    #[test]
    fn test_malformed_csv_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, b"txn_id,amount\nt1,10\nt2,\xff\xfe\n").unwrap();

        let err = read_csv_file(&path).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("bad.csv"), "{message}");
        assert!(message.contains("line 3"), "{message}");
    }

    #[test]
    fn test_read_raw_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let batch = read_raw(&dir.path().join("nothing-here")).unwrap();
        assert!(batch.is_empty());
    }
}
