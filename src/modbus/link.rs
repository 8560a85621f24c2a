// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus link abstraction
//!
//! A [`ModbusLink`] owns the transport of one Modbus client: it opens and
//! closes the connection and issues input register reads. The acquisition
//! session only talks to this trait, which keeps the session testable without
//! a serial port.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SerialConfig;

/// Connection state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// One "Read Input Registers" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Addressed unit on the bus
    pub slave: u8,
    /// First register to read
    pub start_address: u16,
    /// Number of registers to read
    pub count: u16,
}

/// Registers returned by one successful poll, tagged with the start address
/// of the request that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock {
    start_address: u16,
    values: Vec<u16>,
}

impl RegisterBlock {
    pub fn new(start_address: u16, values: Vec<u16>) -> Self {
        Self {
            start_address,
            values,
        }
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the register at an absolute address, if the block covers it.
    pub fn get(&self, address: u16) -> Option<u16> {
        let offset = address.checked_sub(self.start_address)?;
        self.values.get(offset as usize).copied()
    }
}

/// Errors raised by a [`ModbusLink`].
///
/// None of them stops a running session by itself, except a failed connect
/// at session start and a failed disconnect at session stop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The request could not be dispatched because no transport is open
    #[error("Link is not connected")]
    NotConnected,

    #[error("Unsupported serial setting: {0}")]
    UnsupportedSetting(String),

    #[error("Connect failed on {port}: {reason}")]
    Open { port: String, reason: String },

    /// The device answered with a Modbus exception
    #[error("Modbus exception: {0}")]
    Exception(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Disconnect failed: {0}")]
    Disconnect(String),
}

impl LinkError {
    /// `true` when the request never reached the wire.
    pub fn is_dispatch_error(&self) -> bool {
        matches!(self, LinkError::NotConnected)
    }
}

/// Client side of a Modbus transport.
///
/// Implementations keep at most one transport open. `poll` takes `&mut self`,
/// so a second read can never be issued before the previous one resolved.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModbusLink: Send {
    /// Open the transport with the given serial parameters.
    ///
    /// An already open transport is fully closed first; the new parameters
    /// never overlay the old ones.
    async fn connect(&mut self, settings: &SerialConfig) -> Result<(), LinkError>;

    /// Close the transport. Does nothing when already disconnected.
    async fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Read input registers (function 0x04).
    async fn poll(&mut self, request: ReadRequest) -> Result<RegisterBlock, LinkError>;

    /// Current connection state.
    fn state(&self) -> LinkState;
}
