//! Errors raised while setting up the device and running the capture loop

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// How the daemon reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup cannot continue; exit non-zero
    Fatal,
    /// Drop this snapshot and carry on with the next cycle
    Skip,
    /// Leave the capture loop and shut down cleanly
    LoopFatal,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to open capture device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to query device capabilities: {0}")]
    Capability(#[source] io::Error),

    #[error("device {card} does not support {missing}")]
    Unsupported { card: String, missing: &'static str },

    #[error("failed to negotiate frame format: {0}")]
    Format(#[source] io::Error),

    #[error("device substituted pixel format {0}, only YUYV is supported")]
    PixelFormat(String),

    #[error("buffer request failed: {0}")]
    BufferRequest(#[source] nix::Error),

    #[error("driver granted no capture buffers")]
    NoBuffers,

    #[error("failed to map capture buffer ({length} bytes at offset {offset}): {source}")]
    Map {
        offset: u32,
        length: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to create snapshot directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] nix::Error),

    #[error("failed to detach from controlling session: {0}")]
    Detach(#[source] nix::Error),

    #[error("{op} failed: {source}")]
    Protocol {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("failed to allocate {bytes} bytes for RGB frame")]
    Allocation { bytes: usize },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode snapshot {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl SnapshotError {
    pub fn severity(&self) -> Severity {
        match self {
            SnapshotError::Protocol { .. } => Severity::LoopFatal,
            SnapshotError::Allocation { .. }
            | SnapshotError::Write { .. }
            | SnapshotError::Encode { .. } => Severity::Skip,
            _ => Severity::Fatal,
        }
    }
}

pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;
