// ⏱️ Periodic generate + ETL runner

use crate::config::EtlConfig;
use crate::db::{self, EtlRun};
use crate::generator;
use crate::parser;
use crate::transform::Transformer;
use anyhow::Result;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

/// Read every raw file, transform, and append the result to the warehouse
pub fn run_etl(config: &EtlConfig) -> Result<EtlRun> {
    let batch = parser::read_raw(&config.ingest.raw_dir)?;
    let output = Transformer::new(&config.detection).transform(&batch)?;
    info!("{}", output.report.summary());

    let mut conn = db::open_database(&config.storage.database_path)?;
    db::load(&mut conn, &output)
}

/// One cycle: drop a fresh raw file, then run the ETL over the raw directory.
/// `cycle` offsets the generator seed so successive drops differ.
pub fn run_cycle(config: &EtlConfig, cycle: u64) -> Result<EtlRun> {
    let mut generator_config = config.generator.clone();
    generator_config.seed = generator_config.seed.wrapping_add(cycle);

    generator::generate(&generator_config, &config.ingest.raw_dir)?;
    run_etl(config)
}

/// Run a cycle now, then every `interval`, until `max_cycles` (forever if
/// `None`). A failed cycle is logged and the loop keeps going.
///
/// Returns the number of cycles that succeeded.
pub fn run(config: &EtlConfig, interval: Duration, max_cycles: Option<u64>) -> u64 {
    let mut succeeded = 0;
    let mut cycle = 0;

    loop {
        if max_cycles.is_some_and(|max| cycle >= max) {
            break;
        }

        match run_cycle(config, cycle) {
            Ok(run) => {
                succeeded += 1;
                info!(
                    cycle,
                    run_id = %run.run_id,
                    clean = run.clean_rows,
                    anomalies = run.anomaly_rows,
                    "cycle complete"
                );
            }
            Err(e) => error!(cycle, error = %format!("{e:#}"), "cycle failed"),
        }

        cycle += 1;
        if max_cycles.is_some_and(|max| cycle >= max) {
            break;
        }
        thread::sleep(interval);
    }

    succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_config(dir: &std::path::Path) -> EtlConfig {
        let mut config = EtlConfig::default();
        config.ingest.raw_dir = dir.join("raw");
        config.storage.database_path = dir.join("db/warehouse.db");
        config.generator.rows = 20;
        config.generator.accounts = 3;
        config
    }

    #[test]
    fn test_run_bounded_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let succeeded = run(&config, Duration::from_millis(5), Some(2));
        assert_eq!(succeeded, 2);

        let conn = db::open_database(&config.storage.database_path).unwrap();
        let runs = db::get_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);
        // Each run re-reads the whole raw directory: 20 rows, then 40
        assert_eq!(runs[1].raw_rows, 20);
        assert_eq!(runs[0].raw_rows, 40);
    }

    #[test]
    fn test_zero_cycles_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        assert_eq!(run(&config, Duration::from_millis(1), Some(0)), 0);
        assert!(!config.storage.database_path.exists());
        assert!(!config.ingest.raw_dir.exists());
    }

    #[test]
    fn test_failed_cycle_does_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = temp_config(dir.path());
        // A file where the raw directory should be makes every cycle fail
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        config.ingest.raw_dir = blocker;

        let succeeded = run(&config, Duration::from_millis(1), Some(3));
        assert_eq!(succeeded, 0);
    }

    #[test]
    fn test_run_etl_with_no_raw_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let run = run_etl(&config).unwrap();
        assert_eq!(run.raw_rows, 0);
        assert_eq!(run.clean_rows, 0);
    }
}
