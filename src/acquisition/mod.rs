// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition module
//!
//! This module drives the polling of the instrument: a [`PollScheduler`]
//! paces the reads, an [`AcquisitionSession`] runs the
//! poll → decode → filter → write pipeline and a [`SampleSink`] persists the
//! results.

pub mod scheduler;
pub mod session;
pub mod sink;

pub use scheduler::{PollScheduler, SchedulerStats, Tick};
pub use session::{AcquisitionSession, SessionError, SessionEvent, SessionState};
pub use sink::{SampleSink, SinkError, HEADER};

/// One decoded measurement and its filtered value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub signal: i16,
    pub noise: f32,
    /// Output of the streaming filter fed with `noise + signal`
    pub filtered: f32,
}

impl Sample {
    /// Line written to the output file for this sample, without terminator.
    pub fn to_record(&self) -> String {
        format!("{};{};{}", self.signal, self.noise, self.filtered)
    }
}
