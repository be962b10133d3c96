use std::fmt::Debug;
use std::io;

use crate::{Handle, Interest, RawFd, Result, SourceKey};

/// A readiness strategy: the platform-specific way of blocking until registered sources have
/// pending activity.
///
/// Whatever the underlying OS primitive, [`wait()`][Strategy::wait] must report the readiness of
/// every watched source that is actually ready when it returns, not just the first one the OS
/// primitive happened to notice.
pub(crate) trait Strategy: Debug {
    /// Maximum number of sources that can be watched at the same time, if bounded.
    fn capacity(&self) -> Option<usize>;

    fn is_valid_handle(&self, handle: Handle) -> bool;

    /// Prepares a file descriptor source for being watched. Returns the waitable handle that
    /// represents the descriptor, if the platform needs one.
    fn attach_fd(&self, fd: RawFd, interest: Interest) -> Result<Option<Handle>>;

    /// Releases whatever [`attach_fd()`][Strategy::attach_fd] acquired for a source.
    fn detach(&self, fd: Option<RawFd>, handle: Option<Handle>);

    /// Blocks without timeout until at least one watched source (or the side channel, if
    /// requested) is ready.
    ///
    /// The returned readiness list is parallel to `watched`.
    fn wait(&self, watched: &[Watch], wake_on_side_channel: bool) -> io::Result<Wake>;

    /// Whether the strategy can ever report side channel activity.
    fn services_side_channel(&self) -> bool;

    /// Whether the remaining ready sources of a wake are still dispatched after a callback has
    /// asked the loop to stop.
    fn drains_wake_after_stop(&self) -> bool;
}

/// One entry of the per-iteration snapshot of live sources.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Watch {
    pub(crate) key: SourceKey,
    pub(crate) fd: Option<RawFd>,
    pub(crate) handle: Option<Handle>,
    pub(crate) interest: Interest,
}

/// What a wait observed for one watched source.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Readiness {
    pub(crate) readable: bool,
    pub(crate) writable: bool,

    /// Error or hangup. Takes precedence over readability and writability.
    pub(crate) closed: bool,
}

impl Readiness {
    #[cfg(test)]
    pub(crate) const READABLE: Self = Self {
        readable: true,
        writable: false,
        closed: false,
    };

    #[cfg(test)]
    pub(crate) const WRITABLE: Self = Self {
        readable: false,
        writable: true,
        closed: false,
    };

    #[cfg(any(windows, test))]
    pub(crate) const CLOSED: Self = Self {
        readable: false,
        writable: false,
        closed: true,
    };

    /// Everything the source is interested in, for objects whose signaled state carries no
    /// further detail.
    #[cfg(any(windows, test))]
    pub(crate) fn from_interest(interest: Interest) -> Self {
        Self {
            readable: interest.readable,
            writable: interest.writable,
            closed: false,
        }
    }

    pub(crate) fn is_ready(self) -> bool {
        self.readable || self.writable || self.closed
    }
}

/// Outcome of one [`Strategy::wait()`] call.
#[derive(Debug, Default)]
pub(crate) struct Wake {
    pub(crate) readiness: Vec<Readiness>,

    /// Side channel activity is pending.
    pub(crate) side_channel: bool,
}
