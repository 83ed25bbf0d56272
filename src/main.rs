// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::Result;
use banking_etl::config::EtlConfig;
use banking_etl::{db, generator, logging, parser, scheduler, Transformer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "banking-etl",
    version,
    about = "Batch ETL for banking transactions with rule-based anomaly flags"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $BANKING_ETL_CONFIG or config/etl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the warehouse tables
    InitDb,
    /// Write a synthetic raw CSV drop
    Generate {
        #[arg(long)]
        rows: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Output directory (default: ingest.raw_dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Transform every raw file and append the result to the warehouse
    Etl {
        /// Print the transform report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate + ETL on a fixed interval
    Schedule {
        /// Seconds between cycles (default: schedule.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many cycles
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        cycles: Option<u64>,
    },
    /// Terminal dashboard over the warehouse
    Dashboard,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EtlConfig::load_from_path(path)?,
        None => EtlConfig::load()?,
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging.level);

    match cli.command {
        Commands::InitDb => run_init_db(&config),
        Commands::Generate { rows, seed, out_dir } => {
            if let Some(rows) = rows {
                config.generator.rows = rows;
            }
            if let Some(seed) = seed {
                config.generator.seed = seed;
            }
            let out_dir = out_dir.unwrap_or_else(|| config.ingest.raw_dir.clone());
            let path = generator::generate(&config.generator, &out_dir)?;
            println!("✓ Wrote {} rows to {}", config.generator.rows, path.display());
            Ok(())
        }
        Commands::Etl { json } => run_etl(&config, json),
        Commands::Schedule { interval, cycles } => {
            if let Some(interval) = interval {
                config.schedule.interval_secs = interval;
            }
            config.validate()?;
            println!(
                "⏱️  Running generate + ETL every {}s (Ctrl-C to stop)",
                config.schedule.interval_secs
            );
            let succeeded = scheduler::run(
                &config,
                Duration::from_secs(config.schedule.interval_secs),
                cycles,
            );
            println!("✓ {} cycle(s) succeeded", succeeded);
            Ok(())
        }
        Commands::Dashboard => run_dashboard(&config),
    }
}

fn run_init_db(config: &EtlConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    db::open_database(&config.storage.database_path)?;
    println!(
        "✓ Database initialized with WAL mode at {}",
        config.storage.database_path.display()
    );
    Ok(())
}

fn run_etl(config: &EtlConfig, json: bool) -> Result<()> {
    println!("📂 Reading raw files from {}...", config.ingest.raw_dir.display());
    let batch = parser::read_raw(&config.ingest.raw_dir)?;
    println!("✓ Loaded {} raw rows", batch.len());

    println!("\n🔍 Transforming...");
    let output = Transformer::new(&config.detection).transform(&batch)?;
    println!("✓ {}", output.report.summary());
    for (reason, count) in &output.report.anomalies_by_reason {
        println!("   {:<20} {}", reason, count);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    }

    println!("\n💾 Loading into {}...", config.storage.database_path.display());
    let mut conn = db::open_database(&config.storage.database_path)?;
    let run = db::load(&mut conn, &output)?;
    println!("✓ Run {} appended", run.run_id);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_dashboard(config: &EtlConfig) -> Result<()> {
    let db_path = &config.storage.database_path;

    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: banking-etl etl");
        eprintln!("   to load transactions first.");
        std::process::exit(1);
    }

    let conn = db::open_database(db_path)?;

    println!("📊 Loading dashboard...");
    let snapshot = db::DashboardSnapshot::load(&conn, ui::PREVIEW_ROWS)?;
    println!(
        "✓ {} clean transactions, {} anomalies\n",
        snapshot.clean_count, snapshot.anomaly_count
    );

    let mut app = ui::App::new(snapshot);
    ui::run_ui(&mut app)?;

    println!("\n✅ Dashboard closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_dashboard(_config: &EtlConfig) -> Result<()> {
    eprintln!("❌ Dashboard not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the JSON API: cargo run --bin etl-server --features server");
    std::process::exit(1);
}
