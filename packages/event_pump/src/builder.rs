use std::num::NonZero;

use crate::EventLoop;
use crate::pal::{Strategy, StrategyFacade};

/// Builder for configuring an [`EventLoop`].
///
/// Obtain one from [`EventLoop::builder()`].
#[derive(Debug)]
#[must_use]
pub struct EventLoopBuilder {
    capacity: Option<NonZero<usize>>,
    snapshot_capacity: usize,
    strategy: StrategyFacade,
}

impl EventLoopBuilder {
    pub(crate) fn new() -> Self {
        Self {
            capacity: None,
            snapshot_capacity: 0,
            strategy: StrategyFacade::target(),
        }
    }

    #[cfg(test)]
    pub(crate) fn strategy(mut self, strategy: StrategyFacade) -> Self {
        self.strategy = strategy;
        self
    }

    /// Limits the number of sources that can be registered at the same time.
    ///
    /// The platform may impose a lower limit (63 sources on Windows), in which case the platform
    /// limit applies. By default, only the platform limit applies.
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Preallocates room for this many sources in the working buffers used by every loop
    /// iteration.
    ///
    /// Default is 0, with buffers growing as sources are registered.
    pub fn snapshot_capacity(mut self, count: usize) -> Self {
        self.snapshot_capacity = count;
        self
    }

    /// Builds the event loop with the configured settings.
    #[must_use]
    pub fn build(self) -> EventLoop {
        let capacity = match (self.capacity, self.strategy.capacity()) {
            (Some(requested), Some(platform)) => Some(requested.get().min(platform)),
            (Some(requested), None) => Some(requested.get()),
            (None, platform) => platform,
        };

        EventLoop::from_parts(self.strategy, capacity, self.snapshot_capacity)
    }
}
