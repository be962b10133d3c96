#![cfg_attr(coverage_nightly, coverage(off))]

use std::fmt::Debug;
use std::io;
#[cfg(test)]
use std::sync::Arc;

#[cfg(windows)]
use crate::pal::wait::BuildTargetBindings;
#[cfg(test)]
use crate::pal::wait::MockBindings;
use crate::pal::wait::{Bindings, NetworkEvents};
use crate::{Handle, Interest, RawFd};

/// Hide the real/mock bindings choice behind a single type.
#[derive(Clone)]
pub(crate) enum BindingsFacade {
    #[cfg(windows)]
    Target(&'static BuildTargetBindings),

    #[cfg(test)]
    Mock(Arc<MockBindings>),
}

impl BindingsFacade {
    #[cfg(windows)]
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetBindings)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockBindings) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Bindings for BindingsFacade {
    fn wait_for_any(
        &self,
        handles: &[Handle],
        wake_on_side_channel: bool,
    ) -> io::Result<Option<usize>> {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.wait_for_any(handles, wake_on_side_channel),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.wait_for_any(handles, wake_on_side_channel),
        }
    }

    fn is_signaled(&self, handle: Handle) -> io::Result<bool> {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.is_signaled(handle),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.is_signaled(handle),
        }
    }

    fn side_channel_pending(&self) -> bool {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.side_channel_pending(),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.side_channel_pending(),
        }
    }

    fn create_event(&self) -> io::Result<Handle> {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.create_event(),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.create_event(),
        }
    }

    fn close_event(&self, event: Handle) {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.close_event(event),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.close_event(event),
        }
    }

    fn select_network_events(
        &self,
        socket: RawFd,
        event: Handle,
        interest: Interest,
    ) -> io::Result<()> {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.select_network_events(socket, event, interest),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.select_network_events(socket, event, interest),
        }
    }

    fn enum_network_events(&self, socket: RawFd, event: Handle) -> io::Result<NetworkEvents> {
        match self {
            #[cfg(windows)]
            Self::Target(bindings) => bindings.enum_network_events(socket, event),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.enum_network_events(socket, event),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for BindingsFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(windows)]
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
