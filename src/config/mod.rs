// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the acquisition logger
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema before being deserialized.
//!
//! ## Configuration Structure
//!
//! - `serial`: Serial line of the Modbus RTU link
//! - `modbus`: Polled device, register window and poll period
//! - `output`: Destination file of the samples
//! - `filter`: Streaming filter applied to `noise + signal`
//!
//! ## Usage
//!
//! ```no_run
//! use modbus_acquisition::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("/dev/ttyUSB1".to_string()), // Serial port
//!     Some(19200),                      // Baud rate
//!     None,                             // Slave id
//!     Some(0),                          // Start address
//!     Some(9),                          // Quantity
//!     Some(100),                        // Poll interval (ms)
//!     Some("run.csv".to_string()),      // Output file
//! );
//!
//! let session = config.session_config();
//! println!("Reading {} registers", session.read_length());
//! ```

pub mod filter;
pub mod modbus;
pub mod output;
pub mod serial;
pub mod session;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use filter::{FilterConfig, FilterKind};
pub use modbus::ModbusConfig;
pub use output::OutputConfig;
pub use serial::{Parity, SerialConfig, StopBits, SUPPORTED_BAUD_RATES};
pub use session::{resolved_read_length, ConfigError, SessionConfig, REGISTER_WINDOW};
pub use utils::output_config_schema;

/// Root configuration structure of the acquisition logger.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, so a file only needs the settings that differ.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial line settings of the RTU link.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Polling settings: slave id, register window and poll period.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Output file settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Streaming filter settings.
    #[serde(default)]
    pub filter: FilterConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. An invalid
    /// file leaves a `.sample.yaml` next to it and the load fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // YAML first goes through a generic value so it can be schema-checked
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value = serde_json::from_str(utils::CONFIG_SCHEMA)
            .context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| anyhow::anyhow!("Invalid configuration schema: {}", e))?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only the values that are provided override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `port` - Serial device name
    /// * `baud_rate` - Serial line speed
    /// * `slave_id` - Polled unit identifier
    /// * `start_address` - First input register to read
    /// * `quantity` - Requested register count
    /// * `poll_interval_ms` - Poll period in milliseconds
    /// * `output` - Output file path
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        port: Option<String>,
        baud_rate: Option<u32>,
        slave_id: Option<u8>,
        start_address: Option<u16>,
        quantity: Option<u16>,
        poll_interval_ms: Option<u64>,
        output: Option<String>,
    ) {
        if let Some(port) = port {
            debug!("Overriding serial port from command line: {}", port);
            self.serial.port = port;
        }
        if let Some(baud_rate) = baud_rate {
            debug!("Overriding baud rate from command line: {}", baud_rate);
            self.serial.baud_rate = baud_rate;
        }
        if let Some(slave_id) = slave_id {
            debug!("Overriding slave id from command line: {}", slave_id);
            self.modbus.slave_id = slave_id;
        }
        if let Some(start_address) = start_address {
            debug!("Overriding start address from command line: {}", start_address);
            self.modbus.start_address = start_address;
        }
        if let Some(quantity) = quantity {
            debug!("Overriding quantity from command line: {}", quantity);
            self.modbus.quantity = quantity;
        }
        if let Some(interval) = poll_interval_ms {
            debug!("Overriding poll interval from command line: {} ms", interval);
            self.modbus.poll_interval_ms = interval;
        }
        if let Some(output) = output {
            debug!("Overriding output file from command line: {}", output);
            self.output.path = output;
        }
    }

    /// Snapshot of the session parameters.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            serial: self.serial.clone(),
            slave_id: self.modbus.slave_id,
            start_address: self.modbus.start_address,
            quantity: self.modbus.quantity,
            poll_interval: Duration::from_millis(self.modbus.poll_interval_ms),
            output_path: PathBuf::from(&self.output.path),
        }
    }
}
