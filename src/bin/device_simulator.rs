// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated instrument on a serial port
//!
//! Publishes a slowly varying signal and noise in input registers 5 to 7 and
//! answers Modbus RTU reads on the given port. With a virtual null-modem pair
//! (e.g. `socat -d -d pty,raw,echo=0 pty,raw,echo=0`) the logger can run
//! against it without hardware:
//!
//!   device_simulator --port /dev/pts/3
//!   modbus_acquisition --port /dev/pts/4

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use modbus_acquisition::modbus::DeviceSimulator;
use std::time::Duration;
use tokio::time;
use tokio_modbus::server::rtu::Server;
use tokio_serial::SerialStream;

/// Simulated signal/noise instrument answering Modbus RTU reads
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Serial device to serve on
    #[clap(long)]
    port: String,

    /// Serial line speed
    #[clap(long, default_value = "9600")]
    baud_rate: u32,

    /// Slave id the simulator answers to
    #[clap(long, default_value = "1")]
    slave_id: u8,

    /// Measurement update period in milliseconds
    #[clap(long, default_value = "500")]
    update_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let stream = SerialStream::open(&tokio_serial::new(&args.port, args.baud_rate))
        .with_context(|| format!("Can't open {}", args.port))?;
    info!(
        "Simulating slave {} on {} at {} baud",
        args.slave_id, args.port, args.baud_rate
    );

    let device = DeviceSimulator::new(args.slave_id);
    let updater = device.clone();
    let update_period = Duration::from_millis(args.update_ms.max(1));
    tokio::spawn(async move {
        let mut time_counter: f32 = 0.0;
        let mut ticker = time::interval(update_period);
        loop {
            ticker.tick().await;
            // Slow oscillation plus a faster ripple for the filter to remove
            let signal = (1000.0 * time_counter.sin()) as i16;
            let noise = 5.0 + 2.0 * (time_counter * 7.0).sin();
            debug!("Updating with: signal={}, noise={:.3}", signal, noise);
            updater.set_measurement(signal, noise);
            time_counter += 0.05;
        }
    });

    Server::new(stream)
        .serve_forever(device)
        .await
        .context("Serial transport failed")?;
    info!("Serial port closed");
    Ok(())
}
