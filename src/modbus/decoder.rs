// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register map decoding
//!
//! ## Register Map
//!
//! ### Input Registers (Read Only)
//!
//! | Register Address | Description | Encoding |
//! |-----------------|-------------|----------|
//! | 5 | Signal | `i16` |
//! | 6 | Noise, low word | byte swapped |
//! | 7 | Noise, high word | byte swapped |
//!
//! Both noise words are converted to network byte order, the second one is
//! placed in the high 16 bits and the resulting word is read as an IEEE-754
//! `f32`. This word order is the one the instrument firmware uses, even if it
//! differs from the usual Modbus float layouts.

use thiserror::Error;

use super::RegisterBlock;

/// Modbus function code used for every poll.
pub const READ_INPUT_REGISTERS: u8 = 0x04;
/// Address of the signal register.
pub const SIGNAL_ADDR: u16 = 0x05;
/// Address of the low word of the noise value.
pub const NOISE_ADDR: u16 = 0x06;

/// Errors raised by [`decode`].
///
/// These point at a register window that does not match the register map,
/// not at a transport problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Register {address} is not covered by the block (start {start_address}, {len} registers)")]
    OutOfRange {
        address: u16,
        start_address: u16,
        len: usize,
    },
}

fn register(block: &RegisterBlock, address: u16) -> Result<u16, DecodeError> {
    block.get(address).ok_or(DecodeError::OutOfRange {
        address,
        start_address: block.start_address(),
        len: block.len(),
    })
}

/// Extract `(signal, noise)` from a register block.
pub fn decode(block: &RegisterBlock) -> Result<(i16, f32), DecodeError> {
    let signal = register(block, SIGNAL_ADDR)? as i16;
    let low = register(block, NOISE_ADDR)?.to_be() as u32;
    let high = register(block, NOISE_ADDR + 1)?.to_be() as u32;
    let noise = f32::from_bits(low | (high << 16));
    Ok((signal, noise))
}

/// Register image of a measurement, for addresses 5, 6 and 7.
///
/// This is the inverse of [`decode`]; it is what a device has to publish for
/// the logger to read back `signal` and `noise`.
pub fn encode(signal: i16, noise: f32) -> [u16; 3] {
    let bits = noise.to_bits();
    [
        signal as u16,
        u16::from_be((bits & 0xFFFF) as u16),
        u16::from_be((bits >> 16) as u16),
    ]
}
