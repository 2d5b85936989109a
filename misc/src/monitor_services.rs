//! # Service Health Monitor
//!
//! This utility periodically reads the coordination layer's health registry
//! and logs the status of every registered service, together with a snapshot
//! of active leases and cursors. It connects to the store once at startup;
//! when the store is unreachable it keeps running in standalone mode and says
//! so, since an empty registry is itself a useful signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::{CoordinationSnapshot, Coordinator};
use log::{error, info, warn};
use serde_json::Value;
use tokio::time::sleep;

/// Command-line arguments for the service monitor.
#[derive(Parser, Debug)]
#[command(author, version, about = "Monitors services registered in the coordination store", long_about = None)]
pub struct Args {
    /// Polling frequency in minutes.
    #[arg(short, long, default_value_t = 1)]
    pub frequency: u64,

    /// Seconds without a fresh health timestamp before a service is flagged.
    #[arg(short, long, default_value_t = 120)]
    pub stale_after: u64,
}

/// Initializes the logging system using `fern`.
pub fn setup_logging() -> Result<()> {
    let log_filename = format!(
        "monitor_services_{}.log",
        chrono::Local::now().format("%Y-%m-%d")
    );

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file(log_filename)?)
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;
    let args = Args::parse();
    let interval_duration = Duration::from_secs(args.frequency * 60);

    info!(
        "Starting service monitor. Frequency: {} minute(s)",
        args.frequency
    );

    // The coordinator probes the store exactly once; build it off the async
    // runtime since the redis client is synchronous.
    let coordinator = Arc::new(
        tokio::task::spawn_blocking(Coordinator::from_env)
            .await
            .context("Coordinator init task failed")?,
    );
    if coordinator.is_degraded() {
        warn!("Coordination store unreachable; monitoring this process only (standalone mode).");
    }

    loop {
        let coord = Arc::clone(&coordinator);
        let (snapshot, records) = tokio::task::spawn_blocking(move || {
            let snapshot = coord.snapshot();
            let health = coord.health();
            let records: Vec<(String, Option<Value>)> = snapshot
                .active_services
                .iter()
                .map(|service| (service.clone(), health.read(service)))
                .collect();
            (snapshot, records)
        })
        .await
        .context("Monitor poll task failed")?;

        report(&snapshot, &records, args.stale_after);
        sleep(interval_duration).await;
    }
}

/// Logs one polling cycle: the layer-wide snapshot plus each service record.
fn report(snapshot: &CoordinationSnapshot, records: &[(String, Option<Value>)], stale_after: u64) {
    info!(
        "Snapshot: {} service(s), {} lease(s), {} cursor(s), connected={}",
        snapshot.active_services.len(),
        snapshot.active_locks,
        snapshot.active_cursors,
        snapshot.connected
    );

    for (service, record) in records {
        match record {
            Some(record) => {
                let status = record
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let age = record
                    .get("timestamp")
                    .and_then(Value::as_f64)
                    .map(|ts| snapshot.timestamp - ts);
                match age {
                    Some(age) if age > stale_after as f64 => warn!(
                        "STALE: service '{}' last reported {:.0}s ago (status: {})",
                        service, age, status
                    ),
                    _ => info!("OK: service '{}' is {} ", service, status),
                }
            }
            // Listed a moment ago but gone now; the record aged out mid-cycle.
            None => error!("DOWN: service '{}' has no health record", service),
        }
    }
}
