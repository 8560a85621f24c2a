// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated instrument
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module
//! uses the terms "device" and "client". The device provides the input
//! registers, the client (the logger) polls them.
//!
//! [`DeviceSimulator`] publishes a 10 register input image laid out like the
//! real instrument and answers "Read Input Registers" requests through the
//! `tokio-modbus` [`Service`](tokio_modbus::server::Service) trait, so it can be
//! served by `tokio_modbus::server::rtu::Server` on a serial port or by
//! `tokio_modbus::server::rtu_over_tcp::Server` on a socket.

use std::{
    future,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, error};
use tokio_modbus::prelude::*;

use super::decoder::{encode, SIGNAL_ADDR};
use crate::config::REGISTER_WINDOW;

/// In-memory instrument answering on one slave id.
///
/// Clones share the same register image, so the measurement can be updated
/// while a clone is serving requests.
#[derive(Clone, Debug)]
pub struct DeviceSimulator {
    slave: SlaveId,
    /// Input registers 0..10
    input_registers: Arc<Mutex<Vec<u16>>>,
}

impl Default for DeviceSimulator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl tokio_modbus::server::Service for DeviceSimulator {
    type Request = SlaveRequest<'static>;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let SlaveRequest { slave, request } = req;
        // Requests for other devices on the bus get no answer
        if slave != self.slave {
            debug!("Ignoring request for slave {}", slave);
            return future::ready(Ok(None));
        }

        let res = match request {
            Request::ReadInputRegisters(addr, cnt) => {
                debug!(
                    "Reading {} input registers starting from address {}",
                    cnt, addr
                );
                register_read(&self.registers(), addr, cnt)
                    .map(|values| Some(Response::ReadInputRegisters(values)))
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {request:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl DeviceSimulator {
    /// Create a device answering on `slave`, publishing a zero signal and a
    /// zero noise.
    pub fn new(slave: SlaveId) -> Self {
        Self {
            slave,
            input_registers: Arc::new(Mutex::new(vec![0; REGISTER_WINDOW as usize])),
        }
    }

    pub fn slave(&self) -> SlaveId {
        self.slave
    }

    /// Publish a new measurement in registers 5 to 7.
    pub fn set_measurement(&self, signal: i16, noise: f32) {
        let start = SIGNAL_ADDR as usize;
        self.registers()[start..start + 3].copy_from_slice(&encode(signal, noise));
    }

    /// Copy of the whole input image.
    pub fn snapshot(&self) -> Vec<u16> {
        self.registers().clone()
    }

    fn registers(&self) -> MutexGuard<'_, Vec<u16>> {
        // A panic while holding the lock can't leave the image half written
        self.input_registers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Helper function implementing reading registers from the image.
fn register_read(registers: &[u16], addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
    let start = addr as usize;
    let end = start + cnt as usize;
    if cnt == 0 || end > registers.len() {
        error!("Exception::IllegalDataAddress");
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(registers[start..end].to_vec())
}
