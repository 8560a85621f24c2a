// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).
//! Signal preprocessing module
//!
//! This module handles the smoothing of the acquired samples before they are
//! written to the output file.

pub mod filters;

pub use filters::{LowpassFilter, PassThrough, StreamingFilter};
