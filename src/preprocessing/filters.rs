// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Streaming filters for the acquired samples
//!
//! Unlike block filters, a streaming filter receives one sample per poll and
//! keeps its delay elements between calls. The state is cleared with
//! [`StreamingFilter::reset`] when a new acquisition session starts.

/// Trait for single-input, single-output streaming filters
pub trait StreamingFilter: Send {
    /// Feed one sample and return the filtered value.
    ///
    /// The output depends only on the input and the current state, which is
    /// updated exactly once per call.
    fn process(&mut self, input: f32) -> f32;

    /// Return to the initial state.
    fn reset(&mut self);

    /// Follow a change of the input sample rate (the poll rate, in Hz).
    ///
    /// The state is kept. Filters without a time constant ignore it.
    fn set_sample_rate(&mut self, _sample_rate: f32) {}
}

/// Identity filter
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl StreamingFilter for PassThrough {
    fn process(&mut self, input: f32) -> f32 {
        input
    }

    fn reset(&mut self) {}
}

/// A lowpass filter for removing high frequency noise
///
/// Cascade of first-order IIR sections, each computing
/// `y[n] = y[n-1] + alpha * (x[n] - y[n-1])`. Every section adds -6dB/octave
/// of roll-off above the cutoff frequency.
///
/// The first sample after a reset initialises every section with its value,
/// so the output does not ramp up from zero when logging starts.
///
/// ### Examples
///
/// ```
/// use modbus_acquisition::preprocessing::{LowpassFilter, StreamingFilter};
///
/// // 10 Hz poll rate, 0.5 Hz cutoff, second order
/// let mut filter = LowpassFilter::new(0.5)
///     .with_sample_rate(10.0)
///     .with_order(2);
///
/// assert_eq!(filter.process(4.0), 4.0);
/// let next = filter.process(0.0);
/// assert!(next > 0.0 && next < 4.0);
/// ```
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    cutoff_freq: f32,
    sample_rate: f32,
    order: usize,
    alpha: f32,
    /// Output of each section for the previous sample
    stages: Vec<f32>,
    primed: bool,
}

impl LowpassFilter {
    /// Create a first-order lowpass filter with the specified cutoff frequency
    ///
    /// The default sample rate is 1 Hz, the rate of a one second poll interval.
    pub fn new(cutoff_freq: f32) -> Self {
        let mut filter = Self {
            cutoff_freq,
            sample_rate: 1.0,
            order: 1,
            alpha: 1.0,
            stages: vec![0.0; 1],
            primed: false,
        };
        filter.compute_coefficient();
        filter
    }

    /// Set the sample rate (the poll rate, in Hz)
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self.compute_coefficient();
        self
    }

    /// Set the filter order (number of cascaded first-order sections)
    ///
    /// ### Panics
    ///
    /// Panics if the order is zero
    pub fn with_order(mut self, order: usize) -> Self {
        if order == 0 {
            panic!("Filter order must be greater than 0");
        }
        self.order = order;
        self.stages = vec![0.0; order];
        self.primed = false;
        self
    }

    /// Smoothing coefficient of each section
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn cutoff_freq(&self) -> f32 {
        self.cutoff_freq
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn compute_coefficient(&mut self) {
        let omega_c = 2.0 * std::f32::consts::PI * self.cutoff_freq / self.sample_rate;
        let alpha = omega_c / (omega_c + 1.0);
        // Degenerate parameters fall back to no smoothing at all
        self.alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }
}

impl StreamingFilter for LowpassFilter {
    fn process(&mut self, input: f32) -> f32 {
        if !self.primed {
            let start = if input.is_finite() { input } else { 0.0 };
            self.stages.iter_mut().for_each(|stage| *stage = start);
            self.primed = true;
            return start;
        }

        let mut current = input;
        for stage in self.stages.iter_mut() {
            let filtered = *stage + self.alpha * (current - *stage);
            let filtered = if filtered.is_finite() { filtered } else { 0.0 };
            *stage = filtered;
            current = filtered;
        }
        current
    }

    fn reset(&mut self) {
        self.stages.iter_mut().for_each(|stage| *stage = 0.0);
        self.primed = false;
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.compute_coefficient();
    }
}
