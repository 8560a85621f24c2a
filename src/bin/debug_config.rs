// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Prints the session parameters resolved from a configuration file
use anyhow::Result;
use modbus_acquisition::config::Config;
use std::path::PathBuf;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));

    println!("Testing file: {:?}", path);
    println!("File exists: {}", path.exists());

    let config = match Config::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            println!("Validation failed: {:#}", e);
            return Ok(());
        }
    };

    let session = config.session_config();
    println!("{:#?}", session);
    match session.validate() {
        Ok(()) => println!("Read request: {:?}", session.read_request()),
        Err(e) => println!("Invalid session parameters: {}", e),
    }
    println!("Filter: {:?}", config.filter);

    Ok(())
}
