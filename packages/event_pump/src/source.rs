use std::fmt::{self, Debug, Display};

use crate::Handler;
use crate::pal::Watch;

/// A file descriptor or socket registered with [`EventLoop::register_fd()`][1].
///
/// On Windows this carries a WinSock socket value.
///
/// [1]: crate::EventLoop::register_fd
pub type RawFd = i32;

/// An opaque waitable object registered with [`EventLoop::register_handle()`][1], such as a
/// timer, a device handle or a COM port.
///
/// On Windows this is a `HANDLE`. On Unix platforms a handle is a file descriptor that is
/// identified separately from the descriptors registered via [`EventLoop::register_fd()`][2].
///
/// [1]: crate::EventLoop::register_handle
/// [2]: crate::EventLoop::register_fd
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Handle(isize);

impl Handle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_raw(self) -> isize {
        self.0
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

#[cfg(windows)]
impl From<std::os::windows::io::RawHandle> for Handle {
    fn from(raw: std::os::windows::io::RawHandle) -> Self {
        Self(raw as isize)
    }
}

#[cfg(unix)]
impl From<std::os::fd::BorrowedFd<'_>> for Handle {
    fn from(fd: std::os::fd::BorrowedFd<'_>) -> Self {
        use std::os::fd::AsRawFd;

        Self(fd.as_raw_fd() as isize)
    }
}

/// The identity under which a source was registered or looked up.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Identity {
    /// A file descriptor or socket.
    Fd(RawFd),

    /// A platform handle.
    Handle(Handle),
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fd(fd) => write!(f, "fd {fd}"),
            Self::Handle(handle) => write!(f, "handle {}", handle.0),
        }
    }
}

/// Which readiness conditions a source wants to be notified about.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Interest {
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

/// Stable reference to a registry slot. The generation detects references to sources that have
/// since been destroyed, even if the slot has been reused by a newer source.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SourceKey {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// One registered event producer.
pub(crate) struct Source {
    pub(crate) fd: Option<RawFd>,

    /// For socket sources on Windows, this is the event object created for the socket.
    pub(crate) handle: Option<Handle>,

    pub(crate) interest: Interest,

    /// `None` only while one of this source's callbacks is executing.
    handler: Option<Box<dyn Handler>>,

    /// Removal was requested while the event loop was iterating. The source is no longer
    /// dispatched to and is destroyed at the end of the iteration.
    pub(crate) removed: bool,
}

impl Source {
    pub(crate) fn new(
        fd: Option<RawFd>,
        handle: Option<Handle>,
        interest: Interest,
        handler: Box<dyn Handler>,
    ) -> Self {
        Self {
            fd,
            handle,
            interest,
            handler: Some(handler),
            removed: false,
        }
    }

    pub(crate) fn watch(&self, key: SourceKey) -> Watch {
        Watch {
            key,
            fd: self.fd,
            handle: self.handle,
            interest: self.interest,
        }
    }

    pub(crate) fn take_handler(&mut self) -> Option<Box<dyn Handler>> {
        self.handler.take()
    }

    pub(crate) fn restore_handler(&mut self, handler: Box<dyn Handler>) {
        self.handler = Some(handler);
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("fd", &self.fd)
            .field("handle", &self.handle)
            .field("interest", &self.interest)
            .field("removed", &self.removed)
            .finish_non_exhaustive()
    }
}
