//! snapcam: periodic V4L2 snapshot daemon

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use nix::sys::signal::Signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use snapcam::capture::{FieldMode, FrameFormat, PixelFormat, V4l2Capture};
use snapcam::daemon::{self, Shutdown};
use snapcam::pipeline::{CaptureLoop, LoopExit};
use snapcam::{utils, CaptureConfig, Config, DaemonConfig, OutputConfig};

#[derive(Debug, Parser)]
#[command(
    name = "snapcam",
    version,
    about = "Capture a still frame from a V4L2 camera at a fixed interval"
)]
struct Cli {
    /// Directory snapshots are written to
    #[arg(default_value = snapcam::DEFAULT_SNAPSHOT_DIR)]
    snapshot_directory: PathBuf,

    /// Seconds between snapshots; non-positive or non-numeric values mean 30
    #[arg(allow_negative_numbers = true)]
    interval_seconds: Option<String>,

    /// Capture device
    #[arg(long, default_value = snapcam::DEFAULT_DEVICE)]
    device: PathBuf,

    /// Requested frame width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Requested frame height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// JPEG quality
    #[arg(long, default_value_t = snapcam::pipeline::encode::DEFAULT_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Stay attached to the terminal (for service managers)
    #[arg(long)]
    foreground: bool,

    /// Append logs to this file; it stays open after detaching
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            capture: CaptureConfig {
                device: self.device,
                format: FrameFormat::new(
                    self.width,
                    self.height,
                    PixelFormat::Yuyv,
                    FieldMode::Interlaced,
                ),
            },
            output: OutputConfig {
                directory: self.snapshot_directory,
                interval: utils::resolve_interval(self.interval_seconds.as_deref()),
                quality: self.quality,
            },
            daemon: DaemonConfig {
                detach: !self.foreground,
                log_file: self.log_file,
            },
        }
    }
}

/// Install the subscriber; returns the log file descriptor that has to
/// survive detachment
fn init_tracing(config: &DaemonConfig) -> Result<Option<RawFd>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapcam=info"));

    let Some(path) = &config.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .init();
        return Ok(None);
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("failed to open log file {}", path.display()))?;
    let fd = file.as_raw_fd();

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(Some(fd))
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let mut config = Cli::parse().into_config();
    let log_fd = init_tracing(&config.daemon)?;

    info!("snapcam starting");
    if config.daemon.detach && log_fd.is_none() {
        warn!("No --log-file given, diagnostics are discarded once detached");
    }

    // Validate the whole environment while errors can still reach the terminal
    config.output.directory = utils::prepare_snapshot_dir(&config.output.directory)?;
    let capture = V4l2Capture::initialize(&config.capture)?;

    if config.daemon.detach {
        let keep: Vec<RawFd> = std::iter::once(capture.fd()).chain(log_fd).collect();
        daemon::detach(&keep)?;
    }

    let shutdown = Shutdown::new();
    if let Err(e) = shutdown.install(&[Signal::SIGINT, Signal::SIGTERM]) {
        // stderr may already point at /dev/null
        error!("{}", e);
        return Err(e.into());
    }

    let (summary, capture) = CaptureLoop::new(capture, &config.output, shutdown).run();
    drop(capture);

    match summary.exit {
        LoopExit::Shutdown => info!("Shutdown requested, exiting"),
        LoopExit::DeviceLost(e) => warn!("Exiting after device failure: {}", e),
    }
    Ok(())
}
