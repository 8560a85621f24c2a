// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poll timer with skip-on-overlap back-pressure
//!
//! The scheduler is awaited from the session task, next to the command
//! channel and the in-flight reply, so ticks and control calls never run in
//! parallel. A tick that fires while the previous poll is still pending is
//! skipped rather than queued: a slow link lowers the effective poll rate
//! instead of piling up requests.

use std::time::Duration;

use log::debug;
use tokio::time::{self, Instant};

/// Decision taken on a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No poll pending, a new one must be issued
    Dispatch,
    /// The previous poll is still pending
    Skip,
}

/// Tick counters of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub dispatched: u64,
    pub skipped: u64,
}

/// Fixed period poll timer.
#[derive(Debug)]
pub struct PollScheduler {
    period: Duration,
    /// Deadline of the next tick, `None` while stopped
    next_deadline: Option<Instant>,
    in_flight: bool,
    stats: SchedulerStats,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    /// Create a stopped scheduler.
    pub fn new() -> Self {
        Self {
            period: Duration::from_secs(1),
            next_deadline: None,
            in_flight: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Start ticking; the first tick fires one period from now.
    pub fn start(&mut self, period: Duration) {
        self.period = period;
        self.next_deadline = Some(Instant::now() + period);
        self.in_flight = false;
        self.stats = SchedulerStats::default();
        debug!("Poll scheduler started with a {:?} period", period);
    }

    /// Stop ticking. [`next_tick`](Self::next_tick) never completes afterwards.
    pub fn stop(&mut self) {
        if self.next_deadline.take().is_some() {
            debug!(
                "Poll scheduler stopped ({} dispatched, {} skipped)",
                self.stats.dispatched, self.stats.skipped
            );
        }
    }

    pub fn is_active(&self) -> bool {
        self.next_deadline.is_some()
    }

    /// Change the period of the ticks after the one already scheduled.
    pub fn set_interval(&mut self, period: Duration) {
        debug!("Poll period changed from {:?} to {:?}", self.period, period);
        self.period = period;
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Wait for the next tick.
    ///
    /// Cancel safe: dropping the future before it completes leaves the
    /// schedule untouched.
    pub async fn next_tick(&mut self) -> Tick {
        let Some(deadline) = self.next_deadline else {
            return std::future::pending().await;
        };
        time::sleep_until(deadline).await;

        let now = Instant::now();
        let mut next = deadline + self.period;
        if next <= now {
            // Missed deadlines are dropped, not replayed in a burst
            next = now + self.period;
        }
        self.next_deadline = Some(next);

        if self.in_flight {
            self.stats.skipped += 1;
            debug!("Previous poll still pending, skipping tick");
            Tick::Skip
        } else {
            self.in_flight = true;
            self.stats.dispatched += 1;
            Tick::Dispatch
        }
    }

    /// Mark the dispatched poll as resolved.
    pub fn poll_resolved(&mut self) {
        self.in_flight = false;
    }
}
