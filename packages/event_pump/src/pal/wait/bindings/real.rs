use std::ffi::c_void;
use std::fmt::Debug;
use std::io;

use tracing::warn;
use windows::Win32::Foundation::{HANDLE, WAIT_FAILED, WAIT_OBJECT_0};
use windows::Win32::Networking::WinSock::{
    FD_CLOSE, FD_READ, FD_READ_BIT, FD_WRITE, FD_WRITE_BIT, SOCKET, SOCKET_ERROR, WSACloseEvent,
    WSACreateEvent, WSAEnumNetworkEvents, WSAEventSelect, WSAGetLastError, WSANETWORKEVENTS,
};
use windows::Win32::System::Threading::{INFINITE, WaitForSingleObject};
use windows::Win32::UI::WindowsAndMessaging::{
    GetQueueStatus, MsgWaitForMultipleObjects, QS_RAWINPUT, QUEUE_STATUS_FLAGS,
};

use crate::pal::wait::{Bindings, NetworkEvents};
use crate::{Handle, Interest, RawFd};

/// FFI bindings that target the real operating system that the build is targeting.
///
/// You would only use different bindings in PAL unit tests that need to use mock bindings.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

// Real OS bindings are excluded from coverage measurement because error paths require
// OS-level failures that are impractical to trigger in tests.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Bindings for BuildTargetBindings {
    fn wait_for_any(
        &self,
        handles: &[Handle],
        wake_on_side_channel: bool,
    ) -> io::Result<Option<usize>> {
        let handles = handles.iter().copied().map(to_win32).collect::<Vec<_>>();

        let wake_mask = if wake_on_side_channel {
            QS_RAWINPUT
        } else {
            QUEUE_STATUS_FLAGS(0)
        };

        // SAFETY: Every handle belongs to a registered source and stays open for the call.
        let result = unsafe {
            MsgWaitForMultipleObjects(Some(handles.as_slice()), false, INFINITE, wake_mask)
        };

        if result == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }

        // Results past the handle count mean the message queue or an abandoned object.
        let index = result.0.wrapping_sub(WAIT_OBJECT_0.0) as usize;
        Ok((index < handles.len()).then_some(index))
    }

    fn is_signaled(&self, handle: Handle) -> io::Result<bool> {
        // SAFETY: The handle belongs to a registered source and stays open for the call.
        let result = unsafe { WaitForSingleObject(to_win32(handle), 0) };

        if result == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(result == WAIT_OBJECT_0)
    }

    fn side_channel_pending(&self) -> bool {
        // SAFETY: No safety requirements.
        unsafe { GetQueueStatus(QS_RAWINPUT) != 0 }
    }

    fn create_event(&self) -> io::Result<Handle> {
        // SAFETY: No safety requirements.
        let event = unsafe { WSACreateEvent() }?;

        Ok(from_win32(event))
    }

    fn close_event(&self, event: Handle) {
        // SAFETY: The event was created by create_event() and is not used afterwards.
        if let Err(error) = unsafe { WSACloseEvent(to_win32(event)) } {
            warn!(?event, %error, "failed to close socket event object");
        }
    }

    fn select_network_events(
        &self,
        socket: RawFd,
        event: Handle,
        interest: Interest,
    ) -> io::Result<()> {
        let mut mask = FD_CLOSE;

        if interest.readable {
            mask |= FD_READ;
        }

        if interest.writable {
            mask |= FD_WRITE;
        }

        // SAFETY: The event was created by create_event() and outlives the association.
        let result = unsafe { WSAEventSelect(to_socket(socket), to_win32(event), mask as i32) };

        if result == SOCKET_ERROR {
            return Err(last_socket_error());
        }

        Ok(())
    }

    fn enum_network_events(&self, socket: RawFd, event: Handle) -> io::Result<NetworkEvents> {
        let mut events = WSANETWORKEVENTS::default();

        // SAFETY: `events` is a valid out-parameter for the duration of the call.
        let result = unsafe {
            WSAEnumNetworkEvents(to_socket(socket), to_win32(event), &raw mut events)
        };

        if result == SOCKET_ERROR {
            return Err(last_socket_error());
        }

        let happened = |flag: u32| events.lNetworkEvents & flag as i32 != 0;
        let failed = |bit: u32| {
            events
                .iErrorCode
                .get(bit as usize)
                .is_some_and(|code| *code != 0)
        };

        Ok(NetworkEvents {
            read: happened(FD_READ),
            read_error: failed(FD_READ_BIT),
            write: happened(FD_WRITE),
            write_error: failed(FD_WRITE_BIT),
            close: happened(FD_CLOSE),
        })
    }
}

fn to_win32(handle: Handle) -> HANDLE {
    HANDLE(handle.as_raw() as *mut c_void)
}

fn from_win32(handle: HANDLE) -> Handle {
    Handle::from_raw(handle.0 as isize)
}

#[expect(
    clippy::cast_sign_loss,
    reason = "sockets are carried as int values, as WinSock itself does for small values"
)]
fn to_socket(socket: RawFd) -> SOCKET {
    SOCKET(socket as usize)
}

fn last_socket_error() -> io::Error {
    // SAFETY: No safety requirements.
    io::Error::from_raw_os_error(unsafe { WSAGetLastError() }.0)
}
