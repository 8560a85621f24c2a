// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus RTU client link
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module
//! uses the terms "client" and "device". The client (this logger) sends read
//! requests; the device addressed by its slave id answers them.
//!
//! The transport is a `tokio-serial` port framed by the `tokio-modbus` RTU
//! codec. Any other byte stream can be attached with [`RtuLink::attach`],
//! which is how the link is exercised against a simulated device.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::{Client, Reader, Slave, SlaveContext};
use tokio_serial::{SerialPortBuilder, SerialStream};

use super::link::{LinkError, LinkState, ModbusLink, ReadRequest, RegisterBlock};
use crate::config::{Parity, SerialConfig, StopBits};

/// Modbus RTU link over a serial port.
///
/// Owns at most one open transport. Each poll addresses the slave id of its
/// request and gives up after the configured response timeout.
pub struct RtuLink {
    /// Open client context, `None` while disconnected
    context: Option<Context>,
    /// Name of the open transport, for logging
    port: Option<String>,
    /// Response timeout applied to every read
    timeout: Duration,
    state: LinkState,
}

impl Default for RtuLink {
    fn default() -> Self {
        Self::new()
    }
}

impl RtuLink {
    /// Create a disconnected link.
    pub fn new() -> Self {
        Self {
            context: None,
            port: None,
            timeout: Duration::from_secs(1),
            state: LinkState::Disconnected,
        }
    }

    /// Create a link connected through an already open byte stream.
    ///
    /// ### Arguments
    ///
    /// * `transport` - Any bidirectional stream carrying RTU frames
    /// * `timeout` - Response timeout applied to every read
    pub fn attach<T>(transport: T, timeout: Duration) -> Self
    where
        T: AsyncRead + AsyncWrite + Debug + Unpin + Send + 'static,
    {
        Self {
            context: Some(rtu::attach_slave(transport, Slave(1))),
            port: Some("attached transport".to_string()),
            timeout,
            state: LinkState::Connected,
        }
    }

    /// Translate the configured serial parameters for the serial backend.
    fn serial_builder(settings: &SerialConfig) -> Result<SerialPortBuilder, LinkError> {
        let parity = match settings.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Space | Parity::Mark => {
                return Err(LinkError::UnsupportedSetting(format!(
                    "{:?} parity",
                    settings.parity
                )))
            }
        };
        let stop_bits = match settings.stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
            StopBits::OneAndHalf => {
                return Err(LinkError::UnsupportedSetting("1.5 stop bits".to_string()))
            }
        };
        let data_bits = match settings.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => {
                return Err(LinkError::UnsupportedSetting(format!(
                    "{} data bits",
                    other
                )))
            }
        };

        Ok(tokio_serial::new(&settings.port, settings.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
            .timeout(settings.timeout()))
    }
}

#[async_trait]
impl ModbusLink for RtuLink {
    async fn connect(&mut self, settings: &SerialConfig) -> Result<(), LinkError> {
        if self.context.is_some() {
            info!("Link already connected, closing it before reconnecting");
            self.disconnect().await?;
        }

        self.state = LinkState::Connecting;
        info!(
            "Opening serial port {} at {} baud ({:?} parity, {} data bits, {:?} stop bits)",
            settings.port,
            settings.baud_rate,
            settings.parity,
            settings.data_bits,
            settings.stop_bits
        );

        let opened = Self::serial_builder(settings).and_then(|builder| {
            SerialStream::open(&builder).map_err(|e| LinkError::Open {
                port: settings.port.clone(),
                reason: e.to_string(),
            })
        });
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.state = LinkState::Disconnected;
                return Err(e);
            }
        };

        self.context = Some(rtu::attach_slave(stream, Slave(1)));
        self.port = Some(settings.port.clone());
        self.timeout = settings.timeout();
        self.state = LinkState::Connected;
        info!("Serial port {} opened", settings.port);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        let Some(mut context) = self.context.take() else {
            self.state = LinkState::Disconnected;
            return Ok(());
        };
        self.state = LinkState::Disconnected;
        let port = self.port.take().unwrap_or_default();

        debug!("Closing Modbus link on {}", port);
        context
            .disconnect()
            .await
            .map_err(|e| LinkError::Disconnect(format!("{}: {}", port, e)))?;
        info!("Modbus link on {} closed", port);
        Ok(())
    }

    async fn poll(&mut self, request: ReadRequest) -> Result<RegisterBlock, LinkError> {
        let context = self.context.as_mut().ok_or(LinkError::NotConnected)?;
        context.set_slave(Slave(request.slave));

        debug!(
            "Reading {} input registers starting from address {} on slave {}",
            request.count, request.start_address, request.slave
        );

        let read = context.read_input_registers(request.start_address, request.count);
        match time::timeout(self.timeout, read).await {
            Err(_) => {
                warn!("No response from slave {} within {:?}", request.slave, self.timeout);
                Err(LinkError::Timeout(self.timeout))
            }
            Ok(Err(e)) => Err(LinkError::Transport(e.to_string())),
            Ok(Ok(Err(exception))) => Err(LinkError::Exception(exception.to_string())),
            Ok(Ok(Ok(values))) => Ok(RegisterBlock::new(request.start_address, values)),
        }
    }

    fn state(&self) -> LinkState {
        self.state
    }
}
