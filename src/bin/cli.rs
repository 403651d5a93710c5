//! Water Monitor CLI
//!
//! Command-line interface for one-shot operations against the store:
//! - Check connectivity to every configured path
//! - Print current status
//! - Write the expected flow rate
//! - Generate a config file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use water_monitor::clock::{Clock, SystemClock};
use water_monitor::config::{generate_default_config, Config, StoreBackend};
use water_monitor::feeds::{alerts_in_collection_order, AlertsFeed};
use water_monitor::model::{sort_newest_first, Alert, RawSystemInfo, Reading, SystemInfo};
use water_monitor::settings::SettingsWriter;
use water_monitor::status::{evaluate, HealthReport};
use water_monitor::store::{FirebaseStore, MemoryStore, QuerySpec, StorePath, StorePtr};

#[derive(Parser)]
#[command(name = "water-monitor-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "One-shot operations for the water monitor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read every configured path once
    Check,

    /// Show the current reading, health, system info and recent alerts
    Status,

    /// Write the expected flow rate (L/min)
    SetFlow {
        /// Reference flow, rounded to two decimals
        rate: f64,
    },

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote default config to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    let store = open_store(&config)?;
    let json = cli.format == "json";

    match cli.command {
        Commands::Check => check(&config, &store, json).await,
        Commands::Status => status(&config, &store, json).await,
        Commands::SetFlow { rate } => {
            let writer = SettingsWriter::new(
                store,
                config.paths.system.as_str(),
                Arc::new(SystemClock),
            );
            let update = writer.set_expected_flow(rate).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&update)?);
            } else {
                println!(
                    "Expected flow set to {:.2} L/min (lastUpdate {})",
                    update.expected_flow_rate,
                    format_time(update.last_update)
                );
            }
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn open_store(config: &Config) -> Result<StorePtr> {
    match config.store.backend {
        StoreBackend::Firebase => Ok(Arc::new(
            FirebaseStore::new(config.store.firebase()).context("Failed to create store client")?,
        )),
        StoreBackend::Memory => {
            eprintln!("Warning: in-memory store is empty in a one-shot command");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn check(config: &Config, store: &StorePtr, json: bool) -> Result<()> {
    let paths = [
        ("reading", &config.paths.current_reading),
        ("alerts", &config.paths.alerts),
        ("system", &config.paths.system),
        ("notification", &config.paths.latest_notification),
        ("history", &config.paths.history),
    ];

    let mut results = Vec::new();
    let mut failures = 0;
    for (name, path) in paths {
        let query = QuerySpec::all().limit_to_last(1);
        let result = match store.get(&StorePath::new(path), &query).await {
            Ok(snapshot) if snapshot.exists() => "ok".to_string(),
            Ok(_) => "absent".to_string(),
            Err(e) => {
                failures += 1;
                format!("error: {}", e)
            }
        };
        results.push(serde_json::json!({"feed": name, "path": path, "result": result}));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Store: {}", config.store.database_url);
        println!();
        for row in &results {
            println!(
                "{:<14} {:<24} {}",
                row["feed"].as_str().unwrap_or("-"),
                row["path"].as_str().unwrap_or("-"),
                row["result"].as_str().unwrap_or("-")
            );
        }
    }

    if failures > 0 {
        bail!("{} of {} paths failed", failures, results.len());
    }
    Ok(())
}

async fn status(config: &Config, store: &StorePtr, json: bool) -> Result<()> {
    let reading: Option<Reading> = store
        .get(&StorePath::new(&config.paths.current_reading), &QuerySpec::all())
        .await?
        .decode()?;
    let report = reading.as_ref().map(|r| evaluate(r, &config.thresholds));

    let raw_system: Option<RawSystemInfo> = store
        .get(&StorePath::new(&config.paths.system), &QuerySpec::all())
        .await?
        .decode()?;
    let system = match raw_system {
        Some(raw) => SystemInfo::derive(
            &raw,
            SystemClock.now_secs(),
            config.feeds.offline_after_secs,
        ),
        None => SystemInfo::offline(),
    };

    let snapshot = store
        .get(
            &StorePath::new(&config.paths.alerts),
            &AlertsFeed::query_for(config.feeds.alert_limit),
        )
        .await?;
    let mut alerts = alerts_in_collection_order(&snapshot);
    sort_newest_first(&mut alerts);

    if json {
        let body = serde_json::json!({
            "reading": reading,
            "health": report,
            "system": system,
            "alerts": alerts,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Water Monitor v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print_system(&system);
    println!();
    match (&reading, &report) {
        (Some(reading), Some(report)) => print_reading(reading, report),
        _ => println!("No current reading"),
    }
    println!();
    print_alerts(&alerts);
    Ok(())
}

fn print_system(system: &SystemInfo) {
    println!(
        "Device:        {}",
        if system.online { "online" } else { "offline" }
    );
    println!("Last update:   {}", format_time(system.last_update));
    println!("Expected flow: {:.2} L/min", system.expected_flow_rate);
}

fn print_reading(reading: &Reading, report: &HealthReport) {
    println!("TDS:           {:.1} ppm ({})", reading.tds, report.quality.label());
    println!(
        "Flow:          {:.2} L/min of {:.2} expected ({})",
        reading.flow_rate,
        reading.expected_flow,
        report.flow.label()
    );
    if let Some(deviation) = report.flow_deviation_pct {
        println!("Deviation:     {:.1}%", deviation);
    }
    println!("Drop leak:     {}", report.drop_leak.label());
    println!("Total volume:  {:.1} L", reading.total_volume);
    println!("Device status: {}", reading.status.label());

    for divergence in &report.divergences {
        println!(
            "  ! {:?} flagged only by {:?}",
            divergence.condition, divergence.flagged_by
        );
    }
}

fn print_alerts(alerts: &[Alert]) {
    if alerts.is_empty() {
        println!("No alerts");
        return;
    }

    println!("{:<20} | {}", "Time", "Message");
    println!("{}", "-".repeat(60));
    for alert in alerts {
        let time = chrono::DateTime::from_timestamp_millis(alert.timestamp)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} | {}", time, alert.message);
    }
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
