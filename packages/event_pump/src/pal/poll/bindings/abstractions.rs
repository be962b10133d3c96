use std::fmt::Debug;
use std::io;

use crate::pal::Readiness;
use crate::{Interest, RawFd};

/// One descriptor passed to `poll(2)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PollRequest {
    pub(crate) fd: RawFd,
    pub(crate) interest: Interest,
}

/// Bindings for FFI calls into the operating system.
///
/// All calls of the polling strategy must go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    // poll() with infinite timeout, translating revents of each request into readiness.
    fn poll(&self, requests: &[PollRequest]) -> io::Result<Vec<Readiness>>;
}
