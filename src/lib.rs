// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus acquisition library
//!
//! This library polls the input registers of an instrument over Modbus RTU,
//! decodes its signal and noise measurements, smooths them with a streaming
//! filter and logs every sample to a `;`-delimited text file.

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod preprocessing;
