pub mod capture;
pub mod daemon;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::PathBuf;
use std::time::Duration;

use capture::frame::FrameFormat;

pub use error::{Result, Severity, SnapshotError};

pub const DEFAULT_DEVICE: &str = "/dev/video0";
pub const DEFAULT_SNAPSHOT_DIR: &str = "/tmp/snapshots";
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Daemon configuration, built once at startup and never mutated
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub output: OutputConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: PathBuf,
    /// Requested format; the driver may adjust it during negotiation
    pub format: FrameFormat,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub interval: Duration,
    pub quality: u8,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Fork into the background; off when a service manager supervises us
    pub detach: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            format: FrameFormat::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            quality: pipeline::encode::DEFAULT_QUALITY,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            detach: true,
            log_file: None,
        }
    }
}
