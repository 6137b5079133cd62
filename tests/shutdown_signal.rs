use std::time::{Duration, Instant};

use nix::sys::signal::{raise, Signal};
use serial_test::serial;
use snapcam::daemon::Shutdown;
use snapcam::SnapshotError;

/// Both tests touch process-wide signal state
fn installed() -> Shutdown {
    use std::sync::OnceLock;
    static SHUTDOWN: OnceLock<Shutdown> = OnceLock::new();
    SHUTDOWN
        .get_or_init(|| {
            let shutdown = Shutdown::new();
            shutdown
                .install(&[Signal::SIGINT, Signal::SIGTERM])
                .unwrap();
            shutdown
        })
        .clone()
}

#[test]
#[serial]
fn sigterm_sets_the_flag_and_interrupts_sleep() {
    let shutdown = installed();

    std::thread::spawn(|| {
        std::thread::sleep(Duration::from_millis(100));
        raise(Signal::SIGTERM).unwrap();
    });

    let start = Instant::now();
    assert!(!shutdown.sleep(Duration::from_secs(30)));
    assert!(shutdown.is_requested());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
#[serial]
fn a_second_flag_cannot_take_over_the_handlers() {
    let _ = installed();

    let other = Shutdown::new();
    let err = other.install(&[Signal::SIGTERM]).unwrap_err();
    assert!(matches!(err, SnapshotError::Signal(_)));
    assert!(!other.is_requested());
}
