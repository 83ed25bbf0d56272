// End-to-end: generate -> read raw -> transform -> load -> dashboard

use banking_etl::config::{EtlConfig, GeneratorConfig};
use banking_etl::db::{self, DashboardSnapshot};
use banking_etl::{generator, parser, scheduler, AnomalyReason, Transformer};
use std::fs;

#[test]
fn test_generated_drop_flows_into_warehouse() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    let db_path = dir.path().join("warehouse.db");

    let gen_config = GeneratorConfig {
        rows: 300,
        seed: 11,
        accounts: 5,
    };
    generator::generate(&gen_config, &raw_dir).unwrap();

    let batch = parser::read_raw(&raw_dir).unwrap();
    assert_eq!(batch.len(), 300);

    let output = Transformer::default().transform(&batch).unwrap();
    assert_eq!(output.clean.len() + output.report.dropped_rows(), batch.len());
    assert_eq!(output.clean.len(), 300);

    // 300 rows across 5 accounts in one week: bursts are unlikely, but every
    // high-value and non-positive row must be flagged exactly once
    let high = output.clean.iter().filter(|t| t.amount > 50_000.0).count();
    let non_positive = output.clean.iter().filter(|t| t.amount <= 0.0).count();
    let flagged = |reason: AnomalyReason| {
        output.report.anomalies_by_reason.get(&reason).copied().unwrap_or(0)
    };
    assert_eq!(flagged(AnomalyReason::HighValue), high);
    assert_eq!(flagged(AnomalyReason::NonPositiveAmount), non_positive);

    let mut conn = db::open_database(&db_path).unwrap();
    let run = db::load(&mut conn, &output).unwrap();
    assert_eq!(run.clean_rows, 300);

    let snapshot = DashboardSnapshot::load(&conn, 10).unwrap();
    assert_eq!(snapshot.clean_count, 300);
    assert_eq!(snapshot.anomaly_count, output.anomalies.len() as i64);
    assert!(snapshot.unique_accounts <= 5);
    assert!(snapshot.top_categories.len() <= DashboardSnapshot::TOP_CATEGORIES);
    assert_eq!(snapshot.full_day_volume().iter().sum::<i64>(), 300);
    assert_eq!(snapshot.recent_clean.len(), 10);
}

#[test]
fn test_mixed_quality_drop() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::write(
        raw_dir.join("drop.csv"),
        "txn_id,account_id,merchant,merchant_category,amount,currency,timestamp,channel\n\
         t1,a1,Zomato,Food,10,INR,2024-01-01T00:00:00Z,app\n\
         t2,a1,Croma,Electronics,60000,INR,2024-01-01T00:00:10Z,pos\n\
         t3,a1,Swiggy,Food,-5,INR,2024-01-01T00:00:20Z,app\n\
         t4,,HP,Fuel,100,INR,2024-01-01T01:00:00Z,pos\n\
         t5,a2,HP,Fuel,abc,INR,2024-01-01T01:00:00Z,pos\n\
         t6,a2,HP,Fuel,100,INR,not-a-date,pos\n",
    )
    .unwrap();

    let mut config = EtlConfig::default();
    config.ingest.raw_dir = raw_dir;
    config.storage.database_path = dir.path().join("db").join("warehouse.db");

    let run = scheduler::run_etl(&config).unwrap();
    assert_eq!(run.raw_rows, 6);
    assert_eq!(run.clean_rows, 3);
    assert_eq!(run.dropped_rows, 3);
    assert_eq!(run.anomaly_rows, 3);

    let conn = db::open_database(&config.storage.database_path).unwrap();
    let mut reasons: Vec<_> = db::anomalies_by_reason(&conn)
        .unwrap()
        .into_iter()
        .map(|(reason, _)| reason)
        .collect();
    reasons.sort();
    assert_eq!(
        reasons,
        vec![
            AnomalyReason::HighValue,
            AnomalyReason::RapidRepeat,
            AnomalyReason::NonPositiveAmount
        ]
    );
}

#[test]
fn test_missing_column_fails_etl_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::write(raw_dir.join("bad.csv"), "txn_id,account_id\nt1,a1\n").unwrap();

    let mut config = EtlConfig::default();
    config.ingest.raw_dir = raw_dir;
    config.storage.database_path = dir.path().join("warehouse.db");

    let err = scheduler::run_etl(&config).unwrap_err();
    assert!(format!("{err}").contains("missing required column"));
    assert!(!config.storage.database_path.exists());
}
