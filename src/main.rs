// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point of the Modbus RTU acquisition logger
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use modbus_acquisition::config::{self, Config};
use modbus_acquisition::daemon::Daemon;

use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

/// Polls an instrument over Modbus RTU and logs its samples to a text file
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Serial device (e.g. /dev/ttyUSB0 or COM3)
    #[arg(long)]
    port: Option<String>,

    /// Serial line speed
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Modbus unit identifier
    #[arg(long)]
    slave_id: Option<u8>,

    /// First input register of each read
    #[arg(long)]
    start_address: Option<u16>,

    /// Requested register count
    #[arg(long)]
    quantity: Option<u16>,

    /// Poll period in milliseconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Output file for the samples
    #[arg(short, long)]
    output: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration: Option<u64>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Completes after `duration` seconds, never when `None`.
async fn wait_duration(duration: Option<u64>) {
    match duration {
        Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
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

    // Check if --show-config-schema flag is set
    if args.show_config_schema {
        return config::output_config_schema();
    }

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        let config = Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        config.session_config().validate()?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Apply command line overrides
    config.apply_args(
        args.port.clone(),
        args.baud_rate,
        args.slave_id,
        args.start_address,
        args.quantity,
        args.poll_interval,
        args.output.clone(),
    );

    info!("Starting acquisition daemon");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal, terminating daemon"),
            Err(err) => warn!("Error waiting for shutdown signal: {}", err),
        },
        _ = wait_duration(args.duration) => info!("Acquisition duration elapsed"),
        _ = daemon.stopped() => warn!("Acquisition ended on its own"),
    }

    daemon.shutdown();
    daemon.join().await
}
