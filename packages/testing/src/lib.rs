#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing `event_pump` against real operating system objects.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[cfg(unix)]
mod pipe;

#[cfg(unix)]
pub use pipe::*;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::*;

/// How long a test may run before it is considered hung.
const TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a test on a separate thread and fails it if it does not complete in time.
///
/// An event loop test that goes wrong tends to block forever in the readiness wait, so every
/// test that runs a real event loop should be wrapped in this.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the test function is executed
/// directly, so that mutation testing can detect hanging mutations on its own terms.
///
/// # Panics
///
/// Panics if the test exceeds the timeout or if the test itself panics.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // The receiver is gone if we already timed out, nothing to do in that case.
        drop(tx.send(test_fn()));
    });

    match rx.recv_timeout(TIMEOUT) {
        Ok(result) => {
            test_thread.join().expect("test thread completed successfully");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not complete within {TIMEOUT:?}");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without reporting a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}
