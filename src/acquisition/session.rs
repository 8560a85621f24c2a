// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition session
//!
//! An [`AcquisitionSession`] ties a [`ModbusLink`], a [`StreamingFilter`], a
//! [`SampleSink`] and a [`PollScheduler`] together. While running, a single
//! tokio task owns all of them and multiplexes three sources with
//! `tokio::select!`:
//!
//! - control commands sent by the session handle,
//! - scheduler ticks,
//! - the reply of the poll currently in flight.
//!
//! The link is moved into the in-flight reply future and handed back when the
//! reply resolves, so at most one read is ever pending and the samples are
//! written in dispatch order.
//!
//! Progress is published as [`SessionEvent`] values on an unbounded channel.
//!
//! ### Example
//!
//! ```no_run
//! use modbus_acquisition::acquisition::{AcquisitionSession, SessionEvent};
//! use modbus_acquisition::config::Config;
//! use modbus_acquisition::modbus::RtuLink;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!     let filter = config.filter.build(config.modbus.poll_interval_ms);
//!     let (mut session, mut events) = AcquisitionSession::new(RtuLink::new(), filter);
//!
//!     session.start(config.session_config()).await?;
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::Sample(sample) = event {
//!             println!("{}", sample.to_record());
//!         }
//!     }
//!     session.stop().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use super::{PollScheduler, Sample, SampleSink, SchedulerStats, SinkError, Tick};
use crate::config::{ConfigError, SessionConfig};
use crate::modbus::{decode, LinkError, ModbusLink, RegisterBlock};
use crate::preprocessing::StreamingFilter;

/// Errors returned by [`AcquisitionSession`] control calls.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session parameters: {0}")]
    Config(#[from] ConfigError),

    /// The link could not be opened, the session stayed idle
    #[error("Can't connect to the device: {0}")]
    Connect(#[source] LinkError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The link could not be released when the session stopped
    #[error("Can't disconnect from the device: {0}")]
    FatalTeardown(#[source] LinkError),

    #[error("Acquisition task failed: {0}")]
    TaskFailed(String),

    /// The link or the filter was lost by a failed acquisition task
    #[error("Link or filter unavailable after a failed acquisition task")]
    Unavailable,
}

impl SessionError {
    /// `true` for errors that must end the program with a failure status.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Sink(_) | SessionError::FatalTeardown(_) | SessionError::TaskFailed(_)
        )
    }
}

/// Progress notifications of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The link is connected and the output file is ready
    Started { output: PathBuf },
    /// A sample was written to the output file
    Sample(Sample),
    /// A recoverable problem, the session keeps running
    Status { at: DateTime<Utc>, message: String },
    /// An error that ends the session
    Fatal { at: DateTime<Utc>, message: String },
    /// The session task is done, the link and the sink are released
    Stopped { stats: SchedulerStats },
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

enum SessionCommand {
    SetInterval(Duration),
    Stats(oneshot::Sender<SchedulerStats>),
    Stop,
}

/// Components handed back by the session task when it ends.
struct Teardown<L> {
    link: Option<L>,
    filter: Box<dyn StreamingFilter>,
    result: Result<(), SessionError>,
}

struct Running<L> {
    commands: UnboundedSender<SessionCommand>,
    task: JoinHandle<Teardown<L>>,
}

/// Extra time given to a pending poll beyond the link response timeout
/// when the session stops.
const REPLY_GRACE: Duration = Duration::from_secs(1);

type PendingReply<L> = Pin<Box<dyn Future<Output = (L, Result<RegisterBlock, LinkError>)> + Send>>;

/// Start/stop controller of the acquisition pipeline.
pub struct AcquisitionSession<L: ModbusLink + 'static> {
    /// Idle components, moved into the session task while running
    link: Option<L>,
    filter: Option<Box<dyn StreamingFilter>>,
    running: Option<Running<L>>,
    events: UnboundedSender<SessionEvent>,
}

impl<L: ModbusLink + 'static> AcquisitionSession<L> {
    /// Create an idle session and the receiver of its events.
    ///
    /// The same link and filter are reused by every run of the session.
    pub fn new(link: L, filter: Box<dyn StreamingFilter>) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            link: Some(link),
            filter: Some(filter),
            running: None,
            events,
        };
        (session, receiver)
    }

    /// `Running` from a successful [`start`](Self::start) until the session
    /// task ends, either through [`stop`](Self::stop) or after a fatal error.
    pub fn state(&self) -> SessionState {
        match &self.running {
            Some(running) if !running.task.is_finished() => SessionState::Running,
            _ => SessionState::Idle,
        }
    }

    /// Connect the link, open the output file and start polling.
    ///
    /// A running session is stopped first. A session that ended on its own
    /// after a fatal error is cleaned up, its error was already reported with a
    /// [`SessionEvent::Fatal`]. On error nothing stays open and the session is
    /// idle.
    pub async fn start(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        match self.running.as_ref().map(|running| running.task.is_finished()) {
            Some(true) => {
                if let Err(err) = self.stop().await {
                    warn!("Previous acquisition ended with: {}", err);
                }
            }
            Some(false) => {
                info!("Acquisition already running, restarting it");
                self.stop().await?;
            }
            None => {}
        }

        config.validate()?;

        let (mut link, mut filter) = match (self.link.take(), self.filter.take()) {
            (Some(link), Some(filter)) => (link, filter),
            (link, filter) => {
                self.link = link;
                self.filter = filter;
                return Err(SessionError::Unavailable);
            }
        };

        info!(
            "Connecting to slave {} on {} ({} baud)",
            config.slave_id, config.serial.port, config.serial.baud_rate
        );
        if let Err(err) = link.connect(&config.serial).await {
            error!("Connection failed: {}", err);
            report_status(&self.events, format!("Connection failed: {}", err));
            self.link = Some(link);
            self.filter = Some(filter);
            return Err(SessionError::Connect(err));
        }

        let sink = match SampleSink::create(&config.output_path) {
            Ok(sink) => sink,
            Err(err) => {
                error!("{}", err);
                if let Err(disconnect_err) = link.disconnect().await {
                    warn!("Disconnect after output failure failed: {}", disconnect_err);
                }
                self.link = Some(link);
                self.filter = Some(filter);
                return Err(err.into());
            }
        };

        filter.reset();
        filter.set_sample_rate(poll_rate(config.poll_interval));

        info!(
            "Acquisition started: {:?} every {:?}",
            config.read_request(),
            config.poll_interval
        );
        let _ = self.events.send(SessionEvent::Started {
            output: config.output_path.clone(),
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_pipeline(
            link,
            filter,
            sink,
            config,
            command_rx,
            self.events.clone(),
        ));
        self.running = Some(Running { commands, task });
        Ok(())
    }

    /// Stop polling, wait for the pending poll, disconnect and close the
    /// output file.
    ///
    /// With a poll in flight this takes up to the response timeout of the
    /// serial settings, plus one second. A link still busy after that is
    /// dropped unreleased and the call fails with
    /// [`SessionError::FatalTeardown`].
    ///
    /// Returns the error that ended the session, if any. Does nothing when
    /// the session is idle.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The task may already have ended after a fatal error
        let _ = running.commands.send(SessionCommand::Stop);

        match running.task.await {
            Ok(teardown) => {
                self.link = teardown.link;
                self.filter = Some(teardown.filter);
                teardown.result
            }
            Err(err) => {
                error!("Acquisition task failed: {}", err);
                Err(SessionError::TaskFailed(err.to_string()))
            }
        }
    }

    /// Change the poll period of the running session.
    ///
    /// The tick already scheduled keeps its deadline. Ignored while idle, the
    /// next start uses the period of its own parameters.
    pub fn set_poll_interval(&mut self, period: Duration) -> Result<(), SessionError> {
        if period.is_zero() {
            return Err(ConfigError::ZeroPollInterval.into());
        }
        if let Some(running) = &self.running {
            let _ = running.commands.send(SessionCommand::SetInterval(period));
        }
        Ok(())
    }

    /// Tick counters of the running session.
    pub async fn stats(&mut self) -> Option<SchedulerStats> {
        let running = self.running.as_ref()?;
        let (reply, receiver) = oneshot::channel();
        running.commands.send(SessionCommand::Stats(reply)).ok()?;
        receiver.await.ok()
    }
}

fn poll_rate(period: Duration) -> f32 {
    1.0 / period.as_secs_f32()
}

fn report_status(events: &UnboundedSender<SessionEvent>, message: String) {
    let _ = events.send(SessionEvent::Status {
        at: Utc::now(),
        message,
    });
}

fn report_fatal(events: &UnboundedSender<SessionEvent>, message: String) {
    let _ = events.send(SessionEvent::Fatal {
        at: Utc::now(),
        message,
    });
}

/// Wait for the reply of the poll in flight, forever when there is none.
async fn wait_reply<L: 'static>(
    in_flight: &mut Option<PendingReply<L>>,
) -> (L, Result<RegisterBlock, LinkError>) {
    match in_flight.as_mut() {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

/// Decode, filter and store one poll reply.
///
/// Link and decode errors skip the sample; only a sink error is returned.
fn handle_reply(
    reply: Result<RegisterBlock, LinkError>,
    filter: &mut dyn StreamingFilter,
    sink: &mut SampleSink,
    events: &UnboundedSender<SessionEvent>,
) -> Result<(), SinkError> {
    let block = match reply {
        Ok(block) => block,
        Err(err) => {
            warn!("Poll failed: {}", err);
            report_status(events, format!("Modbus error: {}", err));
            return Ok(());
        }
    };

    let (signal, noise) = match decode(&block) {
        Ok(values) => values,
        Err(err) => {
            warn!("Sample skipped: {}", err);
            report_status(events, format!("Decode error: {}", err));
            return Ok(());
        }
    };

    let filtered = filter.process(noise + signal as f32);
    let sample = Sample {
        signal,
        noise,
        filtered,
    };
    sink.append(&sample)?;
    debug!("Sample {}", sample.to_record());
    let _ = events.send(SessionEvent::Sample(sample));
    Ok(())
}

async fn run_pipeline<L: ModbusLink + 'static>(
    link: L,
    mut filter: Box<dyn StreamingFilter>,
    mut sink: SampleSink,
    config: SessionConfig,
    mut commands: UnboundedReceiver<SessionCommand>,
    events: UnboundedSender<SessionEvent>,
) -> Teardown<L> {
    let request = config.read_request();
    let mut scheduler = PollScheduler::new();
    scheduler.start(config.poll_interval);

    let mut link = Some(link);
    let mut in_flight: Option<PendingReply<L>> = None;
    let mut result = Ok(());

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::SetInterval(period)) => {
                    scheduler.set_interval(period);
                    filter.set_sample_rate(poll_rate(period));
                }
                Some(SessionCommand::Stats(reply)) => {
                    let _ = reply.send(scheduler.stats());
                }
                // A dropped session handle stops the task too
                Some(SessionCommand::Stop) | None => break,
            },
            tick = scheduler.next_tick() => {
                if tick == Tick::Dispatch {
                    match link.take() {
                        Some(mut polled) => {
                            debug!("Polling {:?}", request);
                            let pending: PendingReply<L> = Box::pin(async move {
                                let reply = polled.poll(request).await;
                                (polled, reply)
                            });
                            in_flight = Some(pending);
                        }
                        None => scheduler.poll_resolved(),
                    }
                }
            }
            (returned, reply) = wait_reply(&mut in_flight) => {
                in_flight = None;
                link = Some(returned);
                scheduler.poll_resolved();
                if let Err(err) = handle_reply(reply, &mut *filter, &mut sink, &events) {
                    error!("{}", err);
                    report_fatal(&events, err.to_string());
                    result = Err(SessionError::Sink(err));
                    break;
                }
            }
        }
    }

    scheduler.stop();

    if let Some(pending) = in_flight.take() {
        debug!("Waiting for the pending poll before disconnecting");
        let bound = config.serial.timeout() + REPLY_GRACE;
        match time::timeout(bound, pending).await {
            Ok((returned, reply)) => {
                link = Some(returned);
                match reply {
                    Ok(_) => debug!("Reply received after stop discarded"),
                    Err(err) => debug!("Pending poll ended after stop: {}", err),
                }
            }
            Err(_) => {
                // The link goes with the abandoned poll
                error!("Pending poll still busy after {:?}, link dropped", bound);
                report_fatal(&events, format!("Link still busy {:?} after stop", bound));
                if result.is_ok() {
                    result = Err(SessionError::FatalTeardown(LinkError::Timeout(bound)));
                }
            }
        }
    }

    if let Some(link) = link.as_mut() {
        if let Err(err) = link.disconnect().await {
            error!("Disconnect failed: {}", err);
            report_fatal(&events, format!("Disconnect failed: {}", err));
            if result.is_ok() {
                result = Err(SessionError::FatalTeardown(err));
            }
        }
    }

    let written = sink.samples_written();
    if let Err(err) = sink.close() {
        error!("{}", err);
        if result.is_ok() {
            result = Err(err.into());
        }
    }

    let stats = scheduler.stats();
    info!(
        "Acquisition stopped: {} samples written, {} polls, {} ticks skipped",
        written, stats.dispatched, stats.skipped
    );
    let _ = events.send(SessionEvent::Stopped { stats });

    Teardown {
        link,
        filter,
        result,
    }
}
