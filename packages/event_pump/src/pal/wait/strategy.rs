use std::io;

use tracing::warn;

use crate::pal::wait::{Bindings, BindingsFacade, NetworkEvents};
use crate::pal::{Readiness, Strategy, Watch, Wake};
use crate::{Error, Handle, Identity, Interest, RawFd, Result};

/// Upper bound on the number of objects a single wait call accepts (`MAXIMUM_WAIT_OBJECTS`).
pub(crate) const MAXIMUM_WAIT_OBJECTS: usize = 64;

/// Number of sources the strategy can watch. One wait slot stays reserved for the side channel
/// wake condition.
pub(crate) const MAX_SOURCES: usize = MAXIMUM_WAIT_OBJECTS - 1;

/// Multi-object wait where the OS reports at most one "winning" object per call.
///
/// After every wake, each watched object other than the winner is re-checked with a
/// non-blocking probe. Without this, an object that is always ready when the wait starts (and
/// sits earlier in the handle list) would win every time and starve all others.
///
/// Socket sources are watched through an event object associated with the socket. Once the
/// event is signaled, the socket's network events tell us what actually happened.
#[derive(Debug)]
pub(crate) struct WaitStrategy {
    bindings: BindingsFacade,
}

impl WaitStrategy {
    pub(crate) const fn new(bindings: BindingsFacade) -> Self {
        Self { bindings }
    }

    fn probe(&self, handle: Handle) -> bool {
        match self.bindings.is_signaled(handle) {
            Ok(signaled) => signaled,
            Err(error) => {
                warn!(?handle, %error, "probing wait object failed; treating it as not ready");
                false
            }
        }
    }

    fn network_readiness(&self, socket: RawFd, event: Handle) -> Readiness {
        match self.bindings.enum_network_events(socket, event) {
            Ok(events) => events.readiness(),
            Err(error) => {
                warn!(socket, %error, "enumerating network events failed; closing source");
                Readiness::CLOSED
            }
        }
    }
}

impl NetworkEvents {
    fn readiness(self) -> Readiness {
        Readiness {
            readable: self.read && !self.read_error,
            writable: self.write && !self.write_error,
            closed: self.close || (self.read && self.read_error) || (self.write && self.write_error),
        }
    }
}

impl Strategy for WaitStrategy {
    fn capacity(&self) -> Option<usize> {
        Some(MAX_SOURCES)
    }

    fn is_valid_handle(&self, handle: Handle) -> bool {
        // Null and INVALID_HANDLE_VALUE.
        handle.as_raw() != 0 && handle.as_raw() != -1
    }

    fn attach_fd(&self, fd: RawFd, interest: Interest) -> Result<Option<Handle>> {
        let event = self
            .bindings
            .create_event()
            .map_err(|source| Error::AllocationFailed {
                identity: Identity::Fd(fd),
                source,
            })?;

        if let Err(source) = self.bindings.select_network_events(fd, event, interest) {
            self.bindings.close_event(event);

            return Err(Error::SubscriptionFailed {
                identity: Identity::Fd(fd),
                source,
            });
        }

        Ok(Some(event))
    }

    fn detach(&self, fd: Option<RawFd>, handle: Option<Handle>) {
        // Only socket sources own their handle; other handles belong to the caller.
        if let (Some(_), Some(event)) = (fd, handle) {
            self.bindings.close_event(event);
        }
    }

    fn wait(&self, watched: &[Watch], wake_on_side_channel: bool) -> io::Result<Wake> {
        let handles = watched
            .iter()
            .filter_map(|watch| watch.handle)
            .collect::<Vec<_>>();

        let winner = self
            .bindings
            .wait_for_any(&handles, wake_on_side_channel)?;

        let side_channel = wake_on_side_channel && self.bindings.side_channel_pending();

        let mut readiness = Vec::with_capacity(watched.len());
        let mut position = 0_usize;

        for watch in watched {
            let Some(handle) = watch.handle else {
                readiness.push(Readiness::default());
                continue;
            };

            let won = winner == Some(position);

            // Cannot overflow because there are fewer handles than addressable memory.
            position = position.wrapping_add(1);

            if !won && !self.probe(handle) {
                readiness.push(Readiness::default());
                continue;
            }

            readiness.push(match watch.fd {
                Some(socket) => self.network_readiness(socket, handle),
                None => Readiness::from_interest(watch.interest),
            });
        }

        Ok(Wake {
            readiness,
            side_channel,
        })
    }

    fn services_side_channel(&self) -> bool {
        true
    }

    fn drains_wake_after_stop(&self) -> bool {
        true
    }
}
