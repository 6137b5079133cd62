//! Cooperative shutdown flag driven by termination signals

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::debug;

use crate::error::{Result, SnapshotError};

/// Flag the signal handler writes to; set once by [`Shutdown::install`]
static SIGNAL_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Longest uninterrupted nap inside [`Shutdown::sleep`]
const SLEEP_SLICE: Duration = Duration::from_millis(100);

extern "C" fn on_terminate(_signal: libc::c_int) {
    // Only an atomic load and store: no allocation, no I/O
    if let Some(flag) = SIGNAL_FLAG.get() {
        flag.store(true, Ordering::Release);
    }
}

/// Shared handle to the shutdown request
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `signals` to this flag.
    ///
    /// Handlers are installed without `SA_RESTART`, so a blocking system call
    /// in progress returns `EINTR` when one of the signals arrives.
    pub fn install(&self, signals: &[Signal]) -> Result<()> {
        let flag = SIGNAL_FLAG.get_or_init(|| Arc::clone(&self.flag));
        if !Arc::ptr_eq(flag, &self.flag) {
            return Err(SnapshotError::Signal(nix::Error::EBUSY));
        }

        let action = SigAction::new(
            SigHandler::Handler(on_terminate),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for &signal in signals {
            // SAFETY: the handler only touches an atomic
            unsafe { sigaction(signal, &action) }.map_err(SnapshotError::Signal)?;
            debug!("Installed shutdown handler for {}", signal);
        }
        Ok(())
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `false` if the sleep was cut short by a shutdown request.
    pub fn sleep(&self, duration: Duration) -> bool {
        // `None` when the deadline is past what `Instant` can represent
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_requested() {
                return false;
            }
            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(SLEEP_SLICE)
                }
                None => SLEEP_SLICE,
            };
            thread::sleep(nap);
        }
    }
}
