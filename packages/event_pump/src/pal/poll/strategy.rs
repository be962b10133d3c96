use std::io;

use crate::pal::poll::{Bindings, BindingsFacade, PollRequest};
use crate::pal::{Strategy, Watch, Wake};
use crate::{Handle, Interest, RawFd, Result};

/// Level-triggered readiness polling over all watched descriptors at once.
///
/// A single `poll(2)` call reports a readiness bitmask for every descriptor, so no per-source
/// re-check is needed. Handle sources are polled as descriptors.
#[derive(Debug)]
pub(crate) struct PollStrategy {
    bindings: BindingsFacade,
}

impl PollStrategy {
    pub(crate) const fn new(bindings: BindingsFacade) -> Self {
        Self { bindings }
    }

    fn request(watch: &Watch) -> PollRequest {
        let fd = watch
            .fd
            .or_else(|| {
                watch
                    .handle
                    .and_then(|handle| RawFd::try_from(handle.as_raw()).ok())
            })
            // poll() ignores negative descriptors, which is what a source without a usable
            // descriptor deserves. Registration validation makes this unreachable in practice.
            .unwrap_or(-1);

        PollRequest {
            fd,
            interest: watch.interest,
        }
    }
}

impl Strategy for PollStrategy {
    fn capacity(&self) -> Option<usize> {
        None
    }

    fn is_valid_handle(&self, handle: Handle) -> bool {
        RawFd::try_from(handle.as_raw()).is_ok_and(|fd| fd >= 0)
    }

    fn attach_fd(&self, _fd: RawFd, _interest: Interest) -> Result<Option<Handle>> {
        Ok(None)
    }

    fn detach(&self, _fd: Option<RawFd>, _handle: Option<Handle>) {}

    fn wait(&self, watched: &[Watch], _wake_on_side_channel: bool) -> io::Result<Wake> {
        let requests = watched.iter().map(Self::request).collect::<Vec<_>>();

        let readiness = self.bindings.poll(&requests)?;

        if readiness.len() != watched.len() {
            return Err(io::Error::other(format!(
                "poll reported {} results for {} descriptors",
                readiness.len(),
                watched.len()
            )));
        }

        Ok(Wake {
            readiness,
            side_channel: false,
        })
    }

    fn services_side_channel(&self) -> bool {
        false
    }

    fn drains_wake_after_stop(&self) -> bool {
        false
    }
}
