use std::io;

#[cfg(any(unix, test))]
use crate::pal::{PollStrategy, poll};
#[cfg(any(windows, test))]
use crate::pal::{WaitStrategy, wait};
use crate::pal::{Strategy, Wake, Watch};
use crate::{Handle, Interest, RawFd, Result};

/// Hides the choice of readiness strategy behind a single type.
///
/// Real code always uses the strategy of the build target. Tests may use either strategy,
/// backed by mock bindings.
#[derive(Debug)]
pub(crate) enum StrategyFacade {
    #[cfg(any(unix, test))]
    Poll(PollStrategy),

    #[cfg(any(windows, test))]
    Wait(WaitStrategy),
}

impl StrategyFacade {
    #[cfg(unix)]
    pub(crate) const fn target() -> Self {
        Self::Poll(PollStrategy::new(poll::BindingsFacade::target()))
    }

    #[cfg(windows)]
    pub(crate) const fn target() -> Self {
        Self::Wait(WaitStrategy::new(wait::BindingsFacade::target()))
    }

    #[cfg(test)]
    pub(crate) fn from_poll_mock(bindings: poll::MockBindings) -> Self {
        Self::Poll(PollStrategy::new(poll::BindingsFacade::from_mock(bindings)))
    }

    #[cfg(test)]
    pub(crate) fn from_wait_mock(bindings: wait::MockBindings) -> Self {
        Self::Wait(WaitStrategy::new(wait::BindingsFacade::from_mock(bindings)))
    }

    fn as_strategy(&self) -> &dyn Strategy {
        match self {
            #[cfg(any(unix, test))]
            Self::Poll(strategy) => strategy,
            #[cfg(any(windows, test))]
            Self::Wait(strategy) => strategy,
        }
    }
}

impl Strategy for StrategyFacade {
    fn capacity(&self) -> Option<usize> {
        self.as_strategy().capacity()
    }

    fn is_valid_handle(&self, handle: Handle) -> bool {
        self.as_strategy().is_valid_handle(handle)
    }

    fn attach_fd(&self, fd: RawFd, interest: Interest) -> Result<Option<Handle>> {
        self.as_strategy().attach_fd(fd, interest)
    }

    fn detach(&self, fd: Option<RawFd>, handle: Option<Handle>) {
        self.as_strategy().detach(fd, handle);
    }

    fn wait(&self, watched: &[Watch], wake_on_side_channel: bool) -> io::Result<Wake> {
        self.as_strategy().wait(watched, wake_on_side_channel)
    }

    fn services_side_channel(&self) -> bool {
        self.as_strategy().services_side_channel()
    }

    fn drains_wake_after_stop(&self) -> bool {
        self.as_strategy().drains_wake_after_stop()
    }
}
