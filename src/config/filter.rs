// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Streaming filter configuration
//!
//! Selects the smoothing applied to `noise + signal` before it is written as
//! the `Filtered` column.

use serde::{Deserialize, Serialize};

use crate::preprocessing::{LowpassFilter, PassThrough, StreamingFilter};

/// Kind of streaming filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Cascaded first-order IIR low-pass filter
    Lowpass,
    /// Identity, the filtered column repeats the input
    Passthrough,
}

/// Configuration of the streaming filter.
///
/// The sample rate of the low-pass filter is the poll rate, so the same
/// cutoff gives the same smoothing time constant whatever the poll interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter implementation
    pub kind: FilterKind,

    /// Cutoff frequency in Hz (low-pass only)
    pub cutoff_freq: f32,

    /// Number of cascaded first-order sections (low-pass only)
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff_freq: 0.5,
            order: 1,
        }
    }
}

impl FilterConfig {
    /// Build the configured filter for a given poll interval.
    ///
    /// A zero poll interval is treated as one millisecond; sessions reject it
    /// earlier anyway.
    pub fn build(&self, poll_interval_ms: u64) -> Box<dyn StreamingFilter> {
        match self.kind {
            FilterKind::Passthrough => Box::new(PassThrough),
            FilterKind::Lowpass => {
                let sample_rate = 1000.0 / poll_interval_ms.max(1) as f32;
                Box::new(
                    LowpassFilter::new(self.cutoff_freq)
                        .with_sample_rate(sample_rate)
                        .with_order(self.order.max(1)),
                )
            }
        }
    }
}
