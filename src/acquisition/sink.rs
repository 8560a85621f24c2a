// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Append-only sample file
//!
//! The output is UTF-8 text with one `Signal;Noise;Filtered` header line and
//! one `;`-delimited record per sample. The file is truncated when a session
//! starts and every record is flushed as soon as it is appended.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use super::Sample;

/// First line of every output file.
pub const HEADER: &str = "Signal;Noise;Filtered";

/// Errors raised by [`SampleSink`]. All of them end the session.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Can't open output file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't write to output file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't close output file {path:?}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writer of the sample file of one session.
#[derive(Debug)]
pub struct SampleSink {
    path: PathBuf,
    writer: BufWriter<File>,
    samples_written: u64,
}

impl SampleSink {
    /// Create (or truncate) the output file and write the header line.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| SinkError::Open {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(open_error)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", HEADER)
            .and_then(|_| writer.flush())
            .map_err(open_error)?;

        info!("Writing samples to {:?}", path);
        Ok(Self {
            path,
            writer,
            samples_written: 0,
        })
    }

    /// Append one record and flush it.
    pub fn append(&mut self, sample: &Sample) -> Result<(), SinkError> {
        writeln!(self.writer, "{}", sample.to_record())
            .and_then(|_| self.writer.flush())
            .map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.samples_written += 1;
        Ok(())
    }

    /// Flush and release the file.
    pub fn close(mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| SinkError::Close {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            "Closed {:?} after {} samples",
            self.path, self.samples_written
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}
