//! pulse-runner: headless driver for the pulse analytics engine.
//!
//! Usage:
//!   pulse-runner --seed 12345 --events 10000 --db run.db --snapshot state.json
//!   pulse-runner --config analytics.json --ipc-mode

mod store;
mod traffic;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use pulse_core::{
    clock::ManualClock,
    config::AnalyticsConfig,
    engine::AnalyticsEngine,
    event::BusinessEvent,
    retention::RetentionSweeper,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use store::AnalyticsStore;
use traffic::TrafficGenerator;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Ingest { event: BusinessEvent },
    OrderTracking { order_id: String },
    FraudSummary,
    StockSummary,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let events = parse_arg(&args, "--events", 10_000u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db");
    let snapshot_path = flag_value(&args, "--snapshot");

    let config = match flag_value(&args, "--config") {
        Some(path) => AnalyticsConfig::load(path)?,
        None => AnalyticsConfig::default(),
    };

    if ipc_mode {
        let engine = Arc::new(AnalyticsEngine::build(config)?);
        let sweeper = match engine.config().retention.sweep_interval() {
            Some(interval) => Some(
                RetentionSweeper::spawn(Arc::clone(&engine), interval)
                    .context("starting retention sweeper")?,
            ),
            None => None,
        };
        run_ipc_loop(&engine)?;
        if let Some(sweeper) = sweeper {
            let passes = sweeper.stop();
            log::info!("retention sweeper stopped after {passes} passes");
        }
        return Ok(());
    }

    println!("pulse-runner");
    println!("  seed:      {seed}");
    println!("  events:    {events}");
    println!("  db:        {}", db.unwrap_or("(none)"));
    println!();

    config.validate()?;
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().context("replay start time")?;
    let clock = Arc::new(ManualClock::new(start));
    let engine = AnalyticsEngine::new(config, clock.clone());

    let store = match db {
        Some(path) => {
            let store = AnalyticsStore::open(path)?;
            store.migrate()?;
            Some(store)
        }
        None => None,
    };
    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4());
    if let Some(store) = &store {
        store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"), start)?;
    }

    let mut traffic = TrafficGenerator::new(seed, start);
    let mut rejected = 0u64;
    let mut notifications = 0u64;
    for _ in 0..events {
        let (at, event) = traffic.next_event();
        clock.set(at);
        match engine.ingest(event) {
            Ok(outcome) => {
                if outcome.needs_notification() {
                    notifications += 1;
                }
                if let Some(store) = &store {
                    store.record_outcome(&run_id, at, &outcome)?;
                }
            }
            Err(e) if e.is_validation() => {
                rejected += 1;
                log::debug!("rejected event: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(path) = snapshot_path {
        let json = engine.snapshot().to_json()?;
        std::fs::write(path, json).with_context(|| format!("writing snapshot to {path}"))?;
        println!("  snapshot written to {path}");
    }

    print_summary(&engine, store.as_ref(), &run_id, events, rejected, notifications)
}

fn run_ipc_loop(engine: &AnalyticsEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string(), "kind": "parse" });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Ingest { event } => match engine.ingest(event) {
                Ok(outcome) => {
                    let notify = outcome.needs_notification();
                    serde_json::json!({ "outcome": outcome, "needs_notification": notify })
                }
                Err(e) => {
                    let kind = if e.is_validation() { "validation" } else { "internal" };
                    serde_json::json!({ "error": e.to_string(), "kind": kind })
                }
            },
            IpcCommand::OrderTracking { order_id } => serde_json::json!({
                "order_id": order_id,
                "tracking": engine.get_order_tracking(&order_id),
            }),
            IpcCommand::FraudSummary => serde_json::to_value(engine.fraud_summary())?,
            IpcCommand::StockSummary => serde_json::to_value(engine.stock_summary())?,
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn print_summary(
    engine: &AnalyticsEngine,
    store: Option<&AnalyticsStore>,
    run_id: &str,
    events: u64,
    rejected: u64,
    notifications: u64,
) -> Result<()> {
    let fraud = engine.fraud_summary();
    let stock = engine.stock_summary();

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {run_id}");
    println!("  events:         {events}");
    println!("  rejected:       {rejected}");
    println!("  notifications:  {notifications}");
    println!("  clock:          {}", engine.now());

    println!();
    println!("=== FRAUD ===");
    println!("  suspicious:     {} ({} in last window)", fraud.total_suspicious, fraud.recent_suspicious);
    println!("  customers:      {}", fraud.customers_monitored);
    println!("  addresses:      {}", fraud.ips_monitored);
    println!("  devices:        {}", fraud.devices_monitored);

    println!();
    println!("=== STOCK ===");
    println!("  products:       {}", stock.products_monitored);
    println!("  critical:       {}", stock.critical_count);
    println!("  warning:        {}", stock.warning_count);
    for alert in engine.stock().alerts_needing_attention().iter().take(5) {
        println!(
            "    {:<8} {:<14} {:>3} units (threshold {})",
            alert.product_id, alert.product_name, alert.current_stock, alert.threshold
        );
    }

    println!();
    println!("=== ORDERS ===");
    println!("  tracked:        {}", engine.orders().orders_tracked());

    if let Some(store) = store {
        println!();
        println!("=== PERSISTED ===");
        for (recommendation, count) in store.recommendation_counts(run_id)? {
            println!("  {recommendation:<14}  {count}");
        }
        println!("  stock alerts:    {}", store.stock_alert_count(run_id)?);
        println!("  order events:    {}", store.order_event_count(run_id)?);
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
