// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use clap::Parser;
use modbus_acquisition::config::{ConfigError, SerialConfig};
use modbus_acquisition::modbus::{decode, ModbusLink, ReadRequest, RtuLink, NOISE_ADDR, SIGNAL_ADDR};

/// One-shot Modbus RTU read of the input registers of an instrument
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Serial device
    #[clap(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial line speed
    #[clap(long, default_value = "9600")]
    baud_rate: u32,

    /// Modbus unit identifier
    #[clap(long, default_value = "1")]
    slave_id: u8,

    /// Starting input register address
    #[clap(long, default_value = "0")]
    input_register: u16,

    /// Number of registers to read
    #[clap(long, default_value = "10")]
    quantity: u16,

    /// Response timeout in milliseconds
    #[clap(long, default_value = "1000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let serial = SerialConfig {
        port: args.port.clone(),
        baud_rate: args.baud_rate,
        timeout_ms: args.timeout_ms,
        ..SerialConfig::default()
    };
    if serial.timeout_ms == 0 {
        return Err(ConfigError::ZeroTimeout.into());
    }

    println!("Connecting to slave {} on {}", args.slave_id, args.port);
    let mut link = RtuLink::new();
    link.connect(&serial)
        .await
        .with_context(|| format!("Can't open {}", args.port))?;

    println!(
        "Reading {} input registers starting at address {}",
        args.quantity, args.input_register
    );
    let request = ReadRequest {
        slave: args.slave_id,
        start_address: args.input_register,
        count: args.quantity,
    };
    let response = link.poll(request).await;
    link.disconnect().await?;
    let block = response?;

    // Display raw results
    println!("Raw register values: {:?}", block.values());
    for (i, value) in block.values().iter().enumerate() {
        let register = block.start_address() + i as u16;
        println!("Register {}: 0x{:04X} ({})", register, value, value);
    }

    match decode(&block) {
        Ok((signal, noise)) => {
            println!("Register {}: Signal = {}", SIGNAL_ADDR, signal);
            println!("Registers {}-{}: Noise = {}", NOISE_ADDR, NOISE_ADDR + 1, noise);
        }
        Err(err) => println!("No measurement in this window: {}", err),
    }

    Ok(())
}
