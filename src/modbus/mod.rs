// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the Modbus RTU client used to poll the instrument and
//! the decoding of its input registers.
//!
//! ## Key Components
//!
//! - [`ModbusLink`]: connection lifecycle and input register reads
//! - [`RtuLink`]: `tokio-modbus` RTU implementation over a serial port
//! - [`decode`]: extraction of the signal and noise measurements
//! - [`DeviceSimulator`]: in-memory instrument answering RTU requests
//!
//! ## Register Map
//!
//! ### Input Registers (Read-Only)
//!
//! - Register 5: Signal (signed 16 bits)
//! - Register 6: Noise low word (byte swapped)
//! - Register 7: Noise high word (byte swapped)

pub mod decoder;
pub mod link;
pub mod rtu_link;
pub mod simulator;

pub use decoder::{decode, encode, DecodeError, NOISE_ADDR, READ_INPUT_REGISTERS, SIGNAL_ADDR};
pub use link::{LinkError, LinkState, ModbusLink, ReadRequest, RegisterBlock};
pub use rtu_link::RtuLink;
pub use simulator::DeviceSimulator;

#[cfg(test)]
pub use link::MockModbusLink;
