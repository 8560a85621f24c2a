// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Immutable acquisition session parameters
//!
//! A [`SessionConfig`] is the snapshot handed to
//! [`AcquisitionSession::start`](crate::acquisition::AcquisitionSession::start).
//! It is validated once, before any port or file is opened.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::serial::{SerialConfig, SUPPORTED_BAUD_RATES};
use crate::modbus::ReadRequest;

/// Size of the readable input register window (addresses 0 to 9).
pub const REGISTER_WINDOW: u16 = 10;

/// Errors raised by [`SessionConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Output file name is empty")]
    EmptyOutputPath,

    #[error("Serial port name is empty")]
    EmptyPort,

    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    #[error("Invalid data bits {0}, expected 5 to 8")]
    InvalidDataBits(u8),

    #[error("Transport timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Invalid slave id {0}, expected 1 to 247")]
    InvalidSlaveId(u8),

    #[error("Start address {0} out of range, expected 0 to 9")]
    StartAddressOutOfRange(u16),

    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Number of registers actually requested for a start address and quantity.
///
/// The request never goes beyond register 9. The extra register added to
/// `quantity` is kept as the front panel always computed it.
///
/// ```
/// use modbus_acquisition::config::resolved_read_length;
///
/// assert_eq!(resolved_read_length(0, 9), 10);
/// assert_eq!(resolved_read_length(5, 0), 1);
/// assert_eq!(resolved_read_length(7, 100), 3);
/// ```
pub fn resolved_read_length(start_address: u16, quantity: u16) -> u16 {
    let remaining = REGISTER_WINDOW.saturating_sub(start_address);
    quantity.saturating_add(1).min(remaining)
}

/// Parameters of one acquisition session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Serial line of the RTU link
    pub serial: SerialConfig,
    /// Polled unit identifier
    pub slave_id: u8,
    /// First input register of each read
    pub start_address: u16,
    /// Requested register count, see [`resolved_read_length`]
    pub quantity: u16,
    /// Poll timer period
    pub poll_interval: Duration,
    /// Output file, truncated at session start
    pub output_path: PathBuf,
}

impl SessionConfig {
    /// Check every invariant of the session parameters.
    ///
    /// The output path is checked first, matching the order in which the
    /// operator is warned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputPath);
        }
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(ConfigError::UnsupportedBaudRate(self.serial.baud_rate));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ConfigError::InvalidDataBits(self.serial.data_bits));
        }
        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(1..=247).contains(&self.slave_id) {
            return Err(ConfigError::InvalidSlaveId(self.slave_id));
        }
        if self.start_address >= REGISTER_WINDOW {
            return Err(ConfigError::StartAddressOutOfRange(self.start_address));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Register count of each read request.
    pub fn read_length(&self) -> u16 {
        resolved_read_length(self.start_address, self.quantity)
    }

    /// The read request issued on every poll tick.
    pub fn read_request(&self) -> ReadRequest {
        ReadRequest {
            slave: self.slave_id,
            start_address: self.start_address,
            count: self.read_length(),
        }
    }
}
