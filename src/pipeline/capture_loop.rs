//! Steady-state capture, convert and encode cycle

use std::time::Instant;

use chrono::Local;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{CaptureDevice, RawFrame};
use crate::daemon::Shutdown;
use crate::error::{Result, Severity, SnapshotError};
use crate::pipeline::{convert, encode};
use crate::OutputConfig;

/// Where the loop is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Enqueued,
    Acquiring,
    Filled,
}

impl LoopState {
    /// The state a successful step moves to
    pub fn next(self) -> LoopState {
        match self {
            LoopState::Idle => LoopState::Enqueued,
            LoopState::Enqueued => LoopState::Acquiring,
            LoopState::Acquiring => LoopState::Filled,
            LoopState::Filled => LoopState::Idle,
        }
    }

    /// Whether moving to `to` follows the cycle; any state may fall back to idle
    pub fn can_move_to(self, to: LoopState) -> bool {
        to == LoopState::Idle || self.next() == to
    }
}

/// Why the loop stopped
#[derive(Debug)]
pub enum LoopExit {
    /// Shutdown was requested
    Shutdown,
    /// The device stopped following the capture protocol
    DeviceLost(SnapshotError),
}

#[derive(Debug)]
pub struct LoopSummary {
    pub cycles: u64,
    pub written: u64,
    pub skipped: u64,
    pub exit: LoopExit,
}

/// Drives one device through enqueue, acquire, convert and encode until
/// shutdown is requested or the device fails
pub struct CaptureLoop<'a, D: CaptureDevice> {
    device: D,
    output: &'a OutputConfig,
    shutdown: Shutdown,
    state: LoopState,
    cycles: u64,
    written: u64,
    skipped: u64,
}

impl<'a, D: CaptureDevice> CaptureLoop<'a, D> {
    pub fn new(device: D, output: &'a OutputConfig, shutdown: Shutdown) -> Self {
        Self {
            device,
            output,
            shutdown,
            state: LoopState::Idle,
            cycles: 0,
            written: 0,
            skipped: 0,
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug_assert!(
            self.state.can_move_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run until shutdown or a device protocol failure.
    ///
    /// The device is handed back so the caller decides when it is released.
    pub fn run(mut self) -> (LoopSummary, D) {
        let format = self.device.format();
        info!(
            "Capturing {}x{} every {:?} into {}",
            format.width,
            format.height,
            self.output.interval,
            self.output.directory.display()
        );

        let exit = loop {
            if self.shutdown.is_requested() {
                break LoopExit::Shutdown;
            }

            match self.cycle() {
                Ok(true) => {}
                Ok(false) => break LoopExit::Shutdown,
                Err(e) => {
                    error!("Capture stopped: {}", e);
                    break LoopExit::DeviceLost(e);
                }
            }

            if !self.shutdown.sleep(self.output.interval) {
                break LoopExit::Shutdown;
            }
        };

        self.transition(LoopState::Idle);
        info!(
            "Capture loop finished after {} cycles ({} written, {} skipped)",
            self.cycles, self.written, self.skipped
        );

        let summary = LoopSummary {
            cycles: self.cycles,
            written: self.written,
            skipped: self.skipped,
            exit,
        };
        (summary, self.device)
    }

    /// One cycle. `Ok(false)` means shutdown interrupted the acquire.
    ///
    /// Only loop-fatal errors are returned; skipped snapshots are logged.
    fn cycle(&mut self) -> Result<bool> {
        if let Err(e) = self.device.enqueue() {
            self.transition(LoopState::Idle);
            return Err(e);
        }
        self.transition(LoopState::Enqueued);

        self.transition(LoopState::Acquiring);
        let started = Instant::now();
        let acquired = match self.device.ensure_streaming() {
            Ok(()) => self.device.acquire(&self.shutdown),
            Err(e) => Err(e),
        };
        let frame = match acquired {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Acquire abandoned for shutdown");
                self.transition(LoopState::Idle);
                return Ok(false);
            }
            Err(e) => {
                self.transition(LoopState::Idle);
                return Err(e);
            }
        };
        // The frame borrows the device, so no `transition` call here
        debug_assert_eq!(self.state, LoopState::Acquiring);
        self.state = LoopState::Filled;
        self.cycles += 1;

        let outcome = save(&frame, self.output);
        self.transition(LoopState::Idle);

        match outcome {
            Ok(()) => {
                self.written += 1;
                metrics::counter!("snapshots_written").increment(1);
                metrics::histogram!("snapshot_time_us")
                    .record(started.elapsed().as_micros() as f64);
                Ok(true)
            }
            Err(e) if e.severity() == Severity::Skip => {
                warn!("Skipping snapshot: {}", e);
                self.skipped += 1;
                metrics::counter!("snapshots_skipped").increment(1);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

/// Convert a filled frame and write it under a timestamped name
fn save(frame: &RawFrame<'_>, output: &OutputConfig) -> Result<()> {
    let format = frame.format;
    if frame.is_short() {
        warn!(
            "Frame {} holds {} of {} bytes, missing pixels will be black",
            frame.sequence,
            frame.data.len(),
            format.frame_len()
        );
    }

    let image = convert::convert(frame.data, format.width, format.height, format.stride)?;

    let path = encode::snapshot_path(&output.directory, &Local::now());
    if path.exists() {
        warn!(
            "Overwriting {}: snapshots within one second share a name",
            path.display()
        );
    }
    encode::encode(&image, &path, output.quality)?;

    info!("Saved snapshot: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_follow_the_cycle() {
        let mut state = LoopState::Idle;
        let mut seen = vec![state];
        for _ in 0..4 {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            [
                LoopState::Idle,
                LoopState::Enqueued,
                LoopState::Acquiring,
                LoopState::Filled,
                LoopState::Idle
            ]
        );
    }

    #[test]
    fn only_idle_may_be_reached_out_of_order() {
        assert!(LoopState::Acquiring.can_move_to(LoopState::Idle));
        assert!(LoopState::Enqueued.can_move_to(LoopState::Acquiring));
        assert!(!LoopState::Idle.can_move_to(LoopState::Filled));
        assert!(!LoopState::Filled.can_move_to(LoopState::Enqueued));
    }
}
