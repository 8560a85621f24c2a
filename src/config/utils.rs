// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::debug;

use super::{Config, FilterKind};

/// JSON schema of the configuration file, embedded at build time.
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./modbus_acquisition --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validates the configuration against rules the JSON schema does not cover.
///
/// # Validation Rules
///
/// - **Session parameters**: every invariant of
///   [`SessionConfig::validate`](super::SessionConfig::validate)
/// - **Filter**: a low-pass filter needs a positive, finite cutoff and at
///   least one section
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    config
        .session_config()
        .validate()
        .context("Invalid session parameters")?;

    if config.filter.kind == FilterKind::Lowpass {
        if !(config.filter.cutoff_freq.is_finite() && config.filter.cutoff_freq > 0.0) {
            anyhow::bail!(
                "Invalid low-pass cutoff frequency: {}",
                config.filter.cutoff_freq
            );
        }
        if config.filter.order == 0 {
            anyhow::bail!("Low-pass filter order must be greater than 0");
        }
    }

    Ok(())
}
