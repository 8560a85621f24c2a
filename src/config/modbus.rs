// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus polling configuration
//!
//! This module defines which device is polled, which part of its input
//! register table is read and how often.

use serde::{Deserialize, Serialize};

/// Configuration of the Modbus polling cycle.
///
/// # Fields
///
/// * `slave_id` - Unit identifier of the device on the serial bus
/// * `start_address` - First input register to read (0 to 9)
/// * `quantity` - Requested register count, see
///   [`resolved_read_length`](crate::config::resolved_read_length)
/// * `poll_interval_ms` - Period of the poll timer in milliseconds
///
/// # Example
///
/// ```
/// use modbus_acquisition::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     slave_id: 3,
///     start_address: 0,
///     quantity: 9,
///     poll_interval_ms: 100,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Unit identifier of the polled device (1-247).
    pub slave_id: u8,

    /// First input register of the read request.
    ///
    /// Valid range is 0-9; the measurement registers live at 5, 6 and 7.
    pub start_address: u16,

    /// Number of registers requested beyond the start address.
    pub quantity: u16,

    /// Poll period in milliseconds. Must be greater than zero.
    pub poll_interval_ms: u64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            slave_id: 1,
            start_address: 0,
            quantity: 9,
            poll_interval_ms: 1000,
        }
    }
}
