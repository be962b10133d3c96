use std::fmt::Debug;
use std::io;

use crate::{Handle, Interest, RawFd};

/// Network events reported for a socket since the previous enumeration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct NetworkEvents {
    pub(crate) read: bool,
    pub(crate) read_error: bool,
    pub(crate) write: bool,
    pub(crate) write_error: bool,
    pub(crate) close: bool,
}

/// Bindings for FFI calls into the operating system.
///
/// All calls of the multi-object wait strategy must go through this trait, enabling them to be
/// mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    /// `MsgWaitForMultipleObjects()` without timeout, optionally also waking on raw input.
    ///
    /// Returns the index of the handle that satisfied the wait, or `None` if the wait was
    /// satisfied by something other than a handle (the message queue or an abandoned object).
    fn wait_for_any(&self, handles: &[Handle], wake_on_side_channel: bool)
    -> io::Result<Option<usize>>;

    /// Non-blocking check whether a single object is signaled.
    fn is_signaled(&self, handle: Handle) -> io::Result<bool>;

    // GetQueueStatus(QS_RAWINPUT) != 0
    fn side_channel_pending(&self) -> bool;

    // WSACreateEvent()
    fn create_event(&self) -> io::Result<Handle>;

    // WSACloseEvent()
    fn close_event(&self, event: Handle);

    /// Associates the socket with the event object. Switches the socket to non-blocking mode.
    fn select_network_events(
        &self,
        socket: RawFd,
        event: Handle,
        interest: Interest,
    ) -> io::Result<()>;

    /// Reads and resets the network events recorded for the socket.
    fn enum_network_events(&self, socket: RawFd, event: Handle) -> io::Result<NetworkEvents>;
}
