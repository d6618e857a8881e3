// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the water treatment plant digital twin.

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::signal;

use wtp_twin::config::Config;
use wtp_twin::daemon::Daemon;

/// Digital twin of a small RO water treatment plant, exposing Modbus TCP
/// and an HTTP telemetry API for ICS security training.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable or disable the Modbus TCP server
    #[arg(long)]
    modbus_enabled: Option<bool>,

    /// Modbus bind address
    #[arg(long)]
    modbus_address: Option<String>,

    /// Modbus TCP port (falls back to 5020 when this one cannot be bound)
    #[arg(long)]
    modbus_port: Option<u16>,

    /// Enable or disable the HTTP server
    #[arg(long)]
    http_enabled: Option<bool>,

    /// HTTP bind address
    #[arg(long)]
    http_address: Option<String>,

    /// HTTP port
    #[arg(short = 'p', long)]
    http_port: Option<u16>,

    /// Physics tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Warmup ticks run before the servers accept connections
    #[arg(long)]
    warmup_ticks: Option<u32>,

    /// Seed for the sensor jitter generator
    #[arg(long)]
    noise_seed: Option<u64>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let mut config = Config::from_env()?;
    config.apply_args(
        args.modbus_enabled,
        args.modbus_address,
        args.modbus_port,
        args.http_enabled,
        args.http_address,
        args.http_port,
        args.tick_ms,
        args.warmup_ticks,
        args.noise_seed,
    );

    let mut daemon = Daemon::new(config);
    daemon.launch().await?;

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal, terminating daemon");
            daemon.shutdown();
            daemon.join().await?;
        }
        Err(err) => {
            eprintln!("error waiting for shutdown signal: {}", err);
        }
    }

    Ok(())
}
