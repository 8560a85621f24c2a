// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Serial line configuration
//!
//! This module defines the serial port parameters used by the Modbus RTU link.
//! The accepted values mirror what the acquisition front panel historically
//! offered; a few of them (space/mark parity, 1.5 stop bits) are accepted here
//! but refused by the serial backend when the link connects.

use serde::{Deserialize, Serialize};

/// Baud rates offered for the RTU link.
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Parity setting of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
    Space,
    Mark,
}

/// Number of stop bits of the serial line.
///
/// Serialized as a number (`1`, `1.5` or `2`) so configuration files read
/// naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

impl TryFrom<f32> for StopBits {
    type Error = String;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if value == 1.0 {
            Ok(StopBits::One)
        } else if value == 1.5 {
            Ok(StopBits::OneAndHalf)
        } else if value == 2.0 {
            Ok(StopBits::Two)
        } else {
            Err(format!("invalid stop bits {}, expected 1, 1.5 or 2", value))
        }
    }
}

impl From<StopBits> for f32 {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => 1.0,
            StopBits::OneAndHalf => 1.5,
            StopBits::Two => 2.0,
        }
    }
}

/// Configuration of the serial port carrying the Modbus RTU traffic.
///
/// # Example
///
/// ```
/// use modbus_acquisition::config::{Parity, SerialConfig, StopBits};
///
/// let serial = SerialConfig {
///     port: "/dev/ttyUSB0".to_string(),
///     baud_rate: 19200,
///     parity: Parity::Even,
///     data_bits: 8,
///     stop_bits: StopBits::One,
///     timeout_ms: 500,
/// };
/// assert_eq!(serial.timeout().as_millis(), 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial device name (`/dev/ttyUSB0`, `COM3`, ...).
    pub port: String,

    /// Line speed, one of [`SUPPORTED_BAUD_RATES`].
    pub baud_rate: u32,

    /// Parity of the line.
    pub parity: Parity,

    /// Data bits per character (5 to 8).
    pub data_bits: u8,

    /// Stop bits per character.
    pub stop_bits: StopBits,

    /// Time to wait for a device answer, in milliseconds.
    pub timeout_ms: u64,
}

impl SerialConfig {
    /// Response timeout as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: StopBits::One,
            timeout_ms: 1000,
        }
    }
}
