use std::fmt::{self, Debug};
use std::ops::ControlFlow;

use crate::{Error, EventLoop, Interest, Result};

/// A source callback. Receives the source's user value and the event loop, which it may use to
/// register or remove sources. Returning [`ControlFlow::Break`] asks the event loop to stop.
pub type Callback<U> = Box<dyn FnMut(&mut U, &mut EventLoop) -> ControlFlow<()>>;

/// Callback for the handle-less side channel (raw input on Windows).
pub type SideChannelCallback = Box<dyn FnMut(&mut EventLoop) -> ControlFlow<()>>;

/// The set of callbacks invoked for one source.
///
/// The close callback is mandatory. At least one of the read and write callbacks must be set;
/// which of them are set determines what readiness the source is watched for.
///
/// # Example
///
/// ```
/// use std::ops::ControlFlow;
///
/// use event_pump::{Callbacks, EventLoop};
///
/// let callbacks = Callbacks::new()
///     .on_read(|received: &mut usize, _: &mut EventLoop| {
///         *received += 1;
///         ControlFlow::Continue(())
///     })
///     .on_close(|_, _| ControlFlow::Break(()));
/// # drop(callbacks);
/// ```
pub struct Callbacks<U> {
    on_read: Option<Callback<U>>,
    on_write: Option<Callback<U>>,
    on_close: Option<Callback<U>>,
}

impl<U> Callbacks<U> {
    /// Creates an empty callback set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            on_read: None,
            on_write: None,
            on_close: None,
        }
    }

    /// Sets the callback invoked when the source is readable.
    #[must_use]
    pub fn on_read<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut U, &mut EventLoop) -> ControlFlow<()> + 'static,
    {
        self.on_read = Some(Box::new(callback));
        self
    }

    /// Sets the callback invoked when the source is writable.
    #[must_use]
    pub fn on_write<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut U, &mut EventLoop) -> ControlFlow<()> + 'static,
    {
        self.on_write = Some(Box::new(callback));
        self
    }

    /// Sets the callback invoked when the source reports an error or hangup. The source is
    /// removed from the event loop after this callback returns.
    #[must_use]
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut U, &mut EventLoop) -> ControlFlow<()> + 'static,
    {
        self.on_close = Some(Box::new(callback));
        self
    }

    /// Checks the registration requirements and derives the interest of the source.
    pub(crate) fn interest(&self) -> Result<Interest> {
        if self.on_close.is_none() {
            return Err(Error::MissingCallback {
                requirement: "the close callback is mandatory",
            });
        }

        if self.on_read.is_none() && self.on_write.is_none() {
            return Err(Error::MissingCallback {
                requirement: "at least one of the read and write callbacks is required",
            });
        }

        Ok(Interest {
            readable: self.on_read.is_some(),
            writable: self.on_write.is_some(),
        })
    }
}

impl<U> Default for Callbacks<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> Debug for Callbacks<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_read", &self.on_read.is_some())
            .field("on_write", &self.on_write.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CallbackKind {
    Read,
    Write,
    Close,
}

/// Type-erased callbacks of one source, bound together with the source's user value.
pub(crate) trait Handler {
    fn invoke(&mut self, kind: CallbackKind, event_loop: &mut EventLoop) -> ControlFlow<()>;
}

struct BoundCallbacks<U> {
    user: U,
    callbacks: Callbacks<U>,
}

impl<U> Handler for BoundCallbacks<U> {
    fn invoke(&mut self, kind: CallbackKind, event_loop: &mut EventLoop) -> ControlFlow<()> {
        let callback = match kind {
            CallbackKind::Read => self.callbacks.on_read.as_mut(),
            CallbackKind::Write => self.callbacks.on_write.as_mut(),
            CallbackKind::Close => self.callbacks.on_close.as_mut(),
        };

        match callback {
            Some(callback) => callback(&mut self.user, event_loop),
            None => ControlFlow::Continue(()),
        }
    }
}

pub(crate) fn bind<U: 'static>(user: U, callbacks: Callbacks<U>) -> Box<dyn Handler> {
    Box::new(BoundCallbacks { user, callbacks })
}
