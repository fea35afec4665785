//! Pi-Organ - organ console scanner
//!
//! Reads the manuals, the pedalboard and the swell shoes of an organ console
//! and plays them as MIDI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pi_organ::config::AppConfig;
use pi_organ::{delivery, hardware, monitor, transport};

/// Pi-Organ - play an organ console's keys and shoes as MIDI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// Print the raw bits of every bank instead of sending MIDI
    #[arg(long)]
    monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        list_ports()?;
        return Ok(());
    }

    info!("Starting Pi-Organ...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;
    info!("Configuration loaded successfully");

    let stop = Arc::new(AtomicBool::new(false));
    tokio::spawn(stop_on_signal(stop.clone()));

    if args.monitor {
        run_monitor(config, stop).await?;
    } else {
        run_app(config, stop).await?;
    }

    info!("Pi-Organ shutdown complete");
    Ok(())
}

async fn run_app(config: AppConfig, stop: Arc<AtomicBool>) -> Result<()> {
    let (sink, drain) = pi_organ::event_queue();

    let transport = transport::connect(&config.sink).await?;
    let period = Duration::from_millis(config.delivery.period_ms);
    let delivery = tokio::spawn(delivery::run(drain, transport, period));

    let mut scan_loop = hardware::build_scan_loop(&config, sink)?;
    info!("Ready to scan {} source(s)", scan_loop.source_count());

    // The scan loop owns the queue producer; dropping it lets delivery finish
    let scanned = tokio::task::spawn_blocking(move || scan_loop.run(&stop))
        .await
        .context("Scan loop panicked")?;

    let delivered = delivery.await.context("Delivery task panicked")?;

    match (scanned, delivered) {
        (Ok(cycles), Ok(events)) => {
            info!("Scanned {} cycles, delivered {} events", cycles, events);
            Ok(())
        }
        (Err(e), delivered) => {
            if let Err(de) = delivered {
                warn!("Delivery also failed: {:#}", de);
            }
            Err(e).context("Scan loop failed")
        }
        (Ok(_), Err(e)) => Err(e),
    }
}

async fn run_monitor(config: AppConfig, stop: Arc<AtomicBool>) -> Result<()> {
    let mut banks: Vec<_> = hardware::open_banks(&config)?
        .into_iter()
        .map(|(name, scanner, _)| (name, scanner))
        .collect();
    if banks.is_empty() {
        anyhow::bail!("No banks configured, nothing to monitor");
    }

    tokio::task::spawn_blocking(move || monitor::run(&mut banks, &stop))
        .await
        .context("Monitor panicked")?
}

fn list_ports() -> Result<()> {
    use colored::*;

    println!("\n{}", "=== Available MIDI Output Ports ===".bold().cyan());

    let ports = transport::list_output_ports()?;
    if ports.is_empty() {
        println!("  {}", "No output ports found".dimmed());
    }
    for port in ports {
        println!("  {}", port);
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

/// Ask the scan loop to stop after its current cycle on Ctrl+C
async fn stop_on_signal(stop: Arc<AtomicBool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        return;
    }
    info!("Shutdown signal received");
    stop.store(true, Ordering::Relaxed);
}
