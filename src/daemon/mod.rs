//! Detaching the process from its invoking session

pub mod shutdown;

pub use shutdown::Shutdown;

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, RawFd};
use std::process;

use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, fork, setsid, sysconf, ForkResult, SysconfVar};
use tracing::info;

use crate::error::{Result, SnapshotError};

/// Descriptor count to sweep when the limit cannot be queried
const FALLBACK_OPEN_MAX: RawFd = 1024;

/// Turn the calling process into a daemon.
///
/// Double fork so the survivor is neither a session nor a group leader, start
/// a new session, ignore SIGCHLD and SIGHUP, reset umask and the working
/// directory, close every inherited descriptor except `keep`, and point the
/// standard streams at `/dev/null`.
pub fn detach(keep: &[RawFd]) -> Result<()> {
    info!("Detaching from controlling terminal");

    fork_and_exit_parent()?;
    setsid().map_err(SnapshotError::Detach)?;

    // SAFETY: SIG_IGN installs no handler code
    unsafe {
        signal(Signal::SIGCHLD, SigHandler::SigIgn).map_err(SnapshotError::Detach)?;
        signal(Signal::SIGHUP, SigHandler::SigIgn).map_err(SnapshotError::Detach)?;
    }

    fork_and_exit_parent()?;

    umask(Mode::empty());
    chdir("/").map_err(SnapshotError::Detach)?;

    close_inherited(keep);
    redirect_std_streams()?;

    info!("Running as daemon (pid {})", process::id());
    Ok(())
}

fn fork_and_exit_parent() -> Result<()> {
    // SAFETY: the process is single-threaded at this point
    match unsafe { fork() }.map_err(SnapshotError::Detach)? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

fn close_inherited(keep: &[RawFd]) {
    let max = sysconf(SysconfVar::OPEN_MAX)
        .ok()
        .flatten()
        .and_then(|n| RawFd::try_from(n).ok())
        .unwrap_or(FALLBACK_OPEN_MAX);

    for fd in (0..max).rev().filter(|fd| !keep.contains(fd)) {
        // SAFETY: nothing in this process owns these descriptors any more
        // except the ones in `keep`
        unsafe {
            libc::close(fd);
        }
    }
}

fn redirect_std_streams() -> Result<()> {
    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| SnapshotError::Detach(e.raw_os_error().map_or(Errno::EIO, Errno::from_raw)))?;

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if null.as_raw_fd() == target {
            continue;
        }
        // SAFETY: both descriptors are open; dup2 replaces `target` atomically
        if unsafe { libc::dup2(null.as_raw_fd(), target) } < 0 {
            return Err(SnapshotError::Detach(Errno::last()));
        }
    }

    if null.as_raw_fd() <= libc::STDERR_FILENO {
        // The standard stream it landed on must stay open
        std::mem::forget(null);
    }
    Ok(())
}
