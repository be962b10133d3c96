#![cfg_attr(coverage_nightly, coverage(off))]

use std::fmt::Debug;
use std::io;
#[cfg(test)]
use std::sync::Arc;

use crate::pal::Readiness;
#[cfg(test)]
use crate::pal::poll::MockBindings;
use crate::pal::poll::{Bindings, PollRequest};
#[cfg(unix)]
use crate::pal::poll::BuildTargetBindings;

/// Enum to hide the real/mock choice behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum BindingsFacade {
    #[cfg(unix)]
    Target(&'static BuildTargetBindings),

    #[cfg(test)]
    Mock(Arc<MockBindings>),
}

impl BindingsFacade {
    #[cfg(unix)]
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetBindings)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockBindings) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Bindings for BindingsFacade {
    fn poll(&self, requests: &[PollRequest]) -> io::Result<Vec<Readiness>> {
        match self {
            #[cfg(unix)]
            Self::Target(bindings) => bindings.poll(requests),
            #[cfg(test)]
            Self::Mock(mock) => mock.poll(requests),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for BindingsFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
