// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the acquisition session as a background task and
//! handles its lifecycle:
//!
//! - session start from the configuration file,
//! - forwarding of the session events to the log,
//! - system health monitoring (heartbeat with poll statistics),
//! - graceful shutdown.
//!
//! ## Architecture
//!
//! The session task itself is owned by the [`AcquisitionSession`]; the daemon
//! adds one supervising task that drains the event channel and stops the
//! session when asked to, or when the session reports a fatal error.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::acquisition::{AcquisitionSession, SessionEvent};
use crate::config::Config;
use crate::modbus::{ModbusLink, RtuLink};

/// Default period of the heartbeat log line.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// Time [`Daemon::join`] waits for each task on top of the serial response
/// timeout, which bounds the wait for a poll in flight.
const JOIN_MARGIN: Duration = Duration::from_secs(10);

/// Manages the background acquisition task.
///
/// # Thread Safety
///
/// The `running` flag and the notifiers are wrapped in an `Arc` to be shared
/// with the supervising task, which checks the flag on every loop iteration.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    /// Wakes the supervising task on shutdown
    shutdown: Arc<Notify>,
    /// Signalled once the session has been stopped
    finished: Arc<Notify>,
    heartbeat_period: Duration,
    join_timeout: Duration,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Examples
    ///
    /// ```
    /// use modbus_acquisition::daemon::Daemon;
    ///
    /// let daemon = Daemon::new();
    /// // Daemon is now ready to launch the acquisition
    /// ```
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
            finished: Arc::new(Notify::new()),
            heartbeat_period: HEARTBEAT_PERIOD,
            join_timeout: JOIN_MARGIN,
        }
    }

    /// Set the period of the heartbeat log line
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Launch the acquisition on the serial port of the configuration
    ///
    /// # Errors
    ///
    /// Fails when the session parameters are invalid, when the serial port
    /// can't be opened or when the output file can't be created. Nothing is
    /// left running in that case.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        self.launch_with_link(config, RtuLink::new()).await
    }

    /// Launch the acquisition with the given link
    ///
    /// Same as [`launch`](Self::launch), for any [`ModbusLink`]
    /// implementation.
    pub async fn launch_with_link<L: ModbusLink + 'static>(
        &mut self,
        config: &Config,
        link: L,
    ) -> Result<()> {
        info!("Starting data acquisition task");

        let filter = config.filter.build(config.modbus.poll_interval_ms);
        let (mut session, mut events) = AcquisitionSession::new(link, filter);
        session.start(config.session_config()).await?;
        self.join_timeout = self
            .join_timeout
            .max(config.serial.timeout() + JOIN_MARGIN);

        let running = self.running.clone();
        let shutdown = self.shutdown.clone();
        let finished = self.finished.clone();
        let heartbeat_period = self.heartbeat_period;

        let task = tokio::spawn(async move {
            let mut heartbeat = time::interval_at(Instant::now() + heartbeat_period, heartbeat_period);
            let mut samples = 0u64;

            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            if matches!(event, SessionEvent::Sample(_)) {
                                samples += 1;
                            }
                            let fatal = matches!(event, SessionEvent::Fatal { .. });
                            log_event(&event);
                            if fatal {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = heartbeat.tick() => {
                        match session.stats().await {
                            Some(stats) => info!(
                                "Daemon heartbeat: {} samples, {} polls, {} ticks skipped",
                                samples, stats.dispatched, stats.skipped
                            ),
                            None => debug!("Daemon heartbeat: session not running"),
                        }
                    }
                }
            }

            let result = session.stop().await;
            while let Ok(event) = events.try_recv() {
                log_event(&event);
            }
            finished.notify_one();
            result.map_err(anyhow::Error::from)
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Wait until the acquisition has stopped, on shutdown or on a fatal
    /// session error
    pub async fn stopped(&self) {
        self.finished.notified().await;
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Wait for all tasks to complete
    ///
    /// Consumes the daemon. This method should be called after
    /// [`shutdown`](Self::shutdown), or once [`stopped`](Self::stopped)
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first error that ended a task: a failed disconnect, an
    /// output write failure, a panic, or a task still running after the serial
    /// response timeout plus ten seconds. Such a task is aborted.
    pub async fn join(self) -> Result<()> {
        let mut outcome = Ok(());
        for mut task in self.tasks {
            let error = match time::timeout(self.join_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => continue,
                Ok(Ok(Err(err))) => err,
                Ok(Err(err)) => anyhow!("Task panicked: {}", err),
                Err(_) => {
                    warn!("Task did not complete within timeout period, may be hung");
                    task.abort();
                    anyhow!("Task still running after {:?}", self.join_timeout)
                }
            };
            error!("{:#}", error);
            if outcome.is_ok() {
                outcome = Err(error);
            }
        }
        outcome
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started { output } => info!("Acquisition running, writing to {:?}", output),
        SessionEvent::Sample(sample) => debug!("{}", sample.to_record()),
        SessionEvent::Status { at, message } => warn!("[{}] {}", at.to_rfc3339(), message),
        SessionEvent::Fatal { at, message } => error!("[{}] {}", at.to_rfc3339(), message),
        SessionEvent::Stopped { stats } => info!(
            "Acquisition stopped after {} polls ({} ticks skipped)",
            stats.dispatched, stats.skipped
        ),
    }
}
