use std::fmt::{self, Debug};
use std::io;
use std::mem;
use std::ops::ControlFlow;

use tracing::{debug, error, trace};

use crate::pal::{Readiness, Strategy, StrategyFacade, Wake, Watch};
use crate::{
    CallbackKind, Callbacks, Error, EventLoopBuilder, Handle, Identity, RawFd, Registry, Result,
    SideChannelCallback, Source, SourceKey, bind,
};

/// A single-threaded readiness dispatch loop.
///
/// Sources (file descriptors, sockets and waitable platform handles) are registered together
/// with a user value and a set of [`Callbacks`]. [`run()`][Self::run] then blocks until sources
/// become ready and invokes their callbacks, over and over, until a callback asks it to stop.
///
/// Callbacks receive the event loop itself and may register or remove sources, including the
/// source whose callback is executing. Removal requested while the loop is dispatching takes
/// effect at the end of the current iteration; the removed source receives no further callbacks
/// in the meantime.
///
/// Sources are dispatched in registration order. If a source reports an error or hangup, only its
/// close callback is invoked and the source is removed automatically afterwards.
///
/// The type is neither `Send` nor `Sync`: callbacks always execute on the thread that owns the
/// event loop.
///
/// # Example
///
/// ```no_run
/// # #[cfg(unix)]
/// # fn main() -> event_pump::Result<()> {
/// use std::ops::ControlFlow;
/// use std::os::fd::AsRawFd;
///
/// use event_pump::{Callbacks, EventLoop};
///
/// let stdin = std::io::stdin();
///
/// let mut event_loop = EventLoop::new();
///
/// event_loop.register_fd(
///     stdin.as_raw_fd(),
///     stdin,
///     Callbacks::new()
///         .on_read(|stdin: &mut std::io::Stdin, _| {
///             let mut line = String::new();
///
///             match stdin.read_line(&mut line) {
///                 Ok(0) | Err(_) => ControlFlow::Break(()),
///                 Ok(_) => ControlFlow::Continue(()),
///             }
///         })
///         .on_close(|_, _| ControlFlow::Break(())),
/// )?;
///
/// event_loop.run();
/// # Ok(())
/// # }
/// # #[cfg(not(unix))]
/// # fn main() {}
/// ```
pub struct EventLoop {
    registry: Registry,
    strategy: StrategyFacade,

    /// Maximum number of live sources, if bounded.
    capacity: Option<usize>,

    /// Callbacks are being dispatched, so removals must be deferred.
    polling: bool,

    side_channel: Option<SideChannelCallback>,

    /// Incremented whenever the side channel callback is replaced or cleared, so a callback that
    /// replaces itself is not restored over its replacement.
    side_channel_version: u64,

    /// The side channel callback was invoked in the current iteration.
    side_channel_serviced: bool,

    /// Working buffer for the per-iteration snapshot of live sources.
    snapshot: Vec<Watch>,
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring an event loop.
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    pub(crate) fn from_parts(
        strategy: StrategyFacade,
        capacity: Option<usize>,
        snapshot_capacity: usize,
    ) -> Self {
        Self {
            registry: Registry::new(),
            strategy,
            capacity,
            polling: false,
            side_channel: None,
            side_channel_version: 0,
            side_channel_serviced: false,
            snapshot: Vec::with_capacity(snapshot_capacity),
        }
    }

    /// Registers a file descriptor (on Windows: a socket) as an event source.
    ///
    /// The source is watched for readability if `callbacks` has a read callback and for
    /// writability if it has a write callback. The `user` value is owned by the event loop until
    /// the source is removed and is handed to every callback of the source.
    ///
    /// The same descriptor may be registered more than once, creating independent sources.
    ///
    /// On Windows, the socket is associated with an event object, which switches it into
    /// non-blocking mode. It stays in non-blocking mode after the source is removed.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `fd` is negative.
    /// * [`Error::MissingCallback`] if the close callback is missing or if neither a read nor a
    ///   write callback is present.
    /// * [`Error::CapacityExceeded`] if the event loop is full.
    /// * [`Error::AllocationFailed`] or [`Error::SubscriptionFailed`] if the operating system
    ///   refused to watch the socket (Windows only).
    ///
    /// On error, the event loop is unchanged.
    pub fn register_fd<U: 'static>(
        &mut self,
        fd: RawFd,
        user: U,
        callbacks: Callbacks<U>,
    ) -> Result<()> {
        let identity = Identity::Fd(fd);

        if fd < 0 {
            return Err(Error::InvalidArgument { identity });
        }

        let interest = callbacks.interest()?;
        self.ensure_capacity()?;

        let handle = self.strategy.attach_fd(fd, interest)?;

        self.registry.insert(Source::new(
            Some(fd),
            handle,
            interest,
            bind(user, callbacks),
        ));

        debug!(%identity, ?interest, "registered source");
        Ok(())
    }

    /// Registers a waitable platform handle as an event source.
    ///
    /// On Windows, the source is ready whenever the handle is signaled, and all of the callbacks
    /// present among the read and write callbacks are invoked. On Unix, the handle is a file
    /// descriptor and behaves exactly like a source registered via
    /// [`register_fd()`][Self::register_fd].
    ///
    /// The event loop does not take ownership of the handle itself; the caller must keep it open
    /// until the source is removed.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `handle` is null or invalid on Windows, or negative on
    ///   Unix.
    /// * [`Error::MissingCallback`] if the close callback is missing or if neither a read nor a
    ///   write callback is present.
    /// * [`Error::CapacityExceeded`] if the event loop is full.
    ///
    /// On error, the event loop is unchanged.
    pub fn register_handle<U: 'static>(
        &mut self,
        handle: Handle,
        user: U,
        callbacks: Callbacks<U>,
    ) -> Result<()> {
        let identity = Identity::Handle(handle);

        if !self.strategy.is_valid_handle(handle) {
            return Err(Error::InvalidArgument { identity });
        }

        let interest = callbacks.interest()?;
        self.ensure_capacity()?;

        self.registry
            .insert(Source::new(None, Some(handle), interest, bind(user, callbacks)));

        debug!(%identity, ?interest, "registered source");
        Ok(())
    }

    /// Removes the earliest registered source with the given file descriptor.
    ///
    /// When called from a callback, the source is destroyed at the end of the current loop
    /// iteration and receives no further callbacks before that. Otherwise, it is destroyed
    /// immediately. Destroying a source drops its user value and callbacks.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no such source is registered.
    pub fn remove_fd(&mut self, fd: RawFd) -> Result<()> {
        let identity = Identity::Fd(fd);

        let key = self
            .registry
            .find_by_fd(fd)
            .ok_or(Error::NotFound { identity })?;

        self.remove(key, identity);
        Ok(())
    }

    /// Removes the earliest registered source with the given handle.
    ///
    /// Removal is deferred the same way as for [`remove_fd()`][Self::remove_fd].
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no such source is registered.
    pub fn remove_handle(&mut self, handle: Handle) -> Result<()> {
        let identity = Identity::Handle(handle);

        let key = self
            .registry
            .find_by_handle(handle)
            .ok_or(Error::NotFound { identity })?;

        self.remove(key, identity);
        Ok(())
    }

    /// Sets the callback for the side channel, replacing any previous one.
    ///
    /// On Windows, the side channel is raw input arriving in the message queue of the thread
    /// running the loop. The callback is invoked before any source callbacks of the same loop
    /// iteration. If it was not invoked in the final iteration, it is invoked once more before
    /// [`run()`][Self::run] returns.
    ///
    /// Other platforms have no side channel and never invoke the callback.
    pub fn set_side_channel_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Self) -> ControlFlow<()> + 'static,
    {
        self.side_channel = Some(Box::new(callback));
        self.side_channel_version = self.side_channel_version.wrapping_add(1);
    }

    /// Removes the side channel callback, if any.
    pub fn clear_side_channel_callback(&mut self) {
        self.side_channel = None;
        self.side_channel_version = self.side_channel_version.wrapping_add(1);
    }

    /// Dispatches readiness to source callbacks until a callback returns
    /// [`ControlFlow::Break`].
    ///
    /// Every iteration takes a snapshot of the live sources, blocks without timeout until at
    /// least one of them is ready, invokes the callbacks of the ready sources and then destroys
    /// the sources removed during the iteration. The loop exits at the end of the iteration in
    /// which a callback asked it to stop. On Unix, no further callbacks are invoked in that
    /// iteration; on Windows, the remaining ready sources of the iteration are still dispatched.
    ///
    /// Failures of the wait itself are logged and the wait is retried.
    ///
    /// # Panics
    ///
    /// Panics if called from a callback of the same event loop.
    pub fn run(&mut self) {
        assert!(
            !self.polling,
            "EventLoop::run() cannot be called from a callback of the same event loop"
        );

        self.polling = true;
        debug!(sources = self.registry.live_len(), "event loop started");

        let max_n = self.capacity.unwrap_or(usize::MAX);

        loop {
            self.side_channel_serviced = false;

            let mut snapshot = mem::take(&mut self.snapshot);
            self.registry.snapshot_into(&mut snapshot, max_n);

            let wake_on_side_channel =
                self.side_channel.is_some() && self.strategy.services_side_channel();

            trace!(sources = snapshot.len(), wake_on_side_channel, "waiting for readiness");

            let wake = match self.strategy.wait(&snapshot, wake_on_side_channel) {
                Ok(wake) => wake,
                Err(source) => {
                    if source.kind() != io::ErrorKind::Interrupted {
                        let error = Error::WaitPrimitiveFailed { source };
                        error!(?error, "readiness wait failed; retrying");
                    }

                    self.snapshot = snapshot;
                    continue;
                }
            };

            let stop = self.dispatch(&snapshot, &wake);
            self.snapshot = snapshot;

            self.purge_removed();

            if stop {
                break;
            }
        }

        if self.strategy.services_side_channel() && !self.side_channel_serviced {
            // Its stop signal is ignored because run() is returning already.
            if self.invoke_side_channel().is_some() {
                trace!("invoked side channel callback after final iteration");
            }

            self.purge_removed();
        }

        self.polling = false;
        debug!(sources = self.registry.live_len(), "event loop stopped");
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.live_len()
    }

    /// Whether no sources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the event loop is currently dispatching callbacks.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Maximum number of sources that can be registered at the same time, if bounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Whether a source with the given file descriptor is registered.
    #[must_use]
    pub fn contains_fd(&self, fd: RawFd) -> bool {
        self.registry.find_by_fd(fd).is_some()
    }

    /// Whether a source with the given handle is registered.
    #[must_use]
    pub fn contains_handle(&self, handle: Handle) -> bool {
        self.registry.find_by_handle(handle).is_some()
    }

    fn ensure_capacity(&self) -> Result<()> {
        match self.capacity {
            Some(capacity) if self.registry.live_len() >= capacity => {
                Err(Error::CapacityExceeded { capacity })
            }
            _ => Ok(()),
        }
    }

    fn remove(&mut self, key: SourceKey, identity: Identity) {
        if self.polling {
            if self.registry.mark_removed(key) {
                debug!(%identity, "source removal deferred until end of iteration");
            }
        } else if let Some(source) = self.registry.remove(key) {
            self.release(&source);
            debug!(%identity, "removed source");
        }
    }

    fn release(&self, source: &Source) {
        self.strategy.detach(source.fd, source.handle);
    }

    fn purge_removed(&mut self) {
        for source in self.registry.drain_removed() {
            trace!(fd = ?source.fd, handle = ?source.handle, "destroying removed source");
            self.release(&source);
        }
    }

    /// Invokes the callbacks of every ready source. Returns whether a callback asked the loop to
    /// stop.
    fn dispatch(&mut self, snapshot: &[Watch], wake: &Wake) -> bool {
        let drain = self.strategy.drains_wake_after_stop();
        let mut stop = false;

        if wake.side_channel {
            self.side_channel_serviced = true;

            if self
                .invoke_side_channel()
                .is_some_and(|flow| flow.is_break())
            {
                stop = true;

                if !drain {
                    return true;
                }
            }
        }

        for (watch, readiness) in snapshot.iter().zip(&wake.readiness) {
            if !readiness.is_ready() {
                continue;
            }

            for kind in callback_kinds(*readiness) {
                let Some(flow) = self.invoke(watch, kind) else {
                    // Removed earlier in this iteration.
                    break;
                };

                if kind == CallbackKind::Close && self.registry.mark_removed(watch.key) {
                    debug!(fd = ?watch.fd, handle = ?watch.handle, "removing source after close");
                }

                if flow.is_break() {
                    stop = true;

                    if !drain {
                        return true;
                    }
                }
            }
        }

        stop
    }

    fn invoke(&mut self, watch: &Watch, kind: CallbackKind) -> Option<ControlFlow<()>> {
        let mut handler = self.registry.take_handler(watch.key)?;

        trace!(fd = ?watch.fd, handle = ?watch.handle, ?kind, "invoking callback");
        let flow = handler.invoke(kind, self);

        self.registry.restore_handler(watch.key, handler);
        Some(flow)
    }

    fn invoke_side_channel(&mut self) -> Option<ControlFlow<()>> {
        let mut callback = self.side_channel.take()?;
        let version = self.side_channel_version;

        trace!("invoking side channel callback");
        let flow = callback(self);

        if self.side_channel_version == version {
            self.side_channel = Some(callback);
        }

        Some(flow)
    }
}

/// The callbacks to invoke for a source, in order. Closure takes precedence over everything else.
fn callback_kinds(readiness: Readiness) -> impl Iterator<Item = CallbackKind> {
    let kinds: &[CallbackKind] = if readiness.closed {
        &[CallbackKind::Close]
    } else {
        match (readiness.readable, readiness.writable) {
            (true, true) => &[CallbackKind::Read, CallbackKind::Write],
            (true, false) => &[CallbackKind::Read],
            (false, true) => &[CallbackKind::Write],
            (false, false) => &[],
        }
    };

    kinds.iter().copied()
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("registry", &self.registry)
            .field("strategy", &self.strategy)
            .field("capacity", &self.capacity)
            .field("polling", &self.polling)
            .field("side_channel", &self.side_channel.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Callbacks may remove sources during teardown, which must not destroy them under us.
        self.polling = true;

        for key in self.registry.live_keys() {
            let Some(source) = self.registry.get(key) else {
                continue;
            };

            let watch = source.watch(key);

            // Stop signals carry no meaning during teardown.
            if self.invoke(&watch, CallbackKind::Close).is_some() {
                self.registry.mark_removed(key);
            }
        }

        for source in self.registry.drain_all() {
            self.release(&source);
        }

        self.polling = false;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use mockall::Sequence;
    use mockall::predicate::eq;
    use new_zealand::nz;
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::pal::poll::PollRequest;
    use crate::pal::wait::NetworkEvents;
    use crate::pal::{poll, wait};
    use crate::{Callback, Interest};

    assert_not_impl_any!(EventLoop: Send, Sync);

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn new_log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<&'static str> {
        log.borrow().clone()
    }

    /// A callback that records its invocation and returns `flow`.
    fn logged(log: &Log, entry: &'static str, flow: ControlFlow<()>) -> Callback<()> {
        let log = Rc::clone(log);

        Box::new(move |_: &mut (), _: &mut EventLoop| {
            log.borrow_mut().push(entry);
            flow
        })
    }

    fn reader(log: &Log, name: &'static str, flow: ControlFlow<()>) -> Callbacks<()> {
        Callbacks::new()
            .on_read(logged(log, name, flow))
            .on_close(logged(log, "close", ControlFlow::Continue(())))
    }

    fn poll_loop(bindings: poll::MockBindings) -> EventLoop {
        EventLoop::builder()
            .strategy(StrategyFacade::from_poll_mock(bindings))
            .build()
    }

    fn wait_loop(bindings: wait::MockBindings) -> EventLoop {
        EventLoop::builder()
            .strategy(StrategyFacade::from_wait_mock(bindings))
            .build()
    }

    fn request(fd: RawFd, readable: bool, writable: bool) -> PollRequest {
        PollRequest {
            fd,
            interest: Interest { readable, writable },
        }
    }

    const CONTINUE: ControlFlow<()> = ControlFlow::Continue(());
    const BREAK: ControlFlow<()> = ControlFlow::Break(());

    #[test]
    fn registration_requires_close_callback() {
        let mut event_loop = poll_loop(poll::MockBindings::new());

        let result = event_loop.register_fd(
            3,
            (),
            Callbacks::new().on_read(|_: &mut (), _: &mut EventLoop| ControlFlow::Continue(())),
        );

        assert!(matches!(result, Err(Error::MissingCallback { .. })));
        assert!(event_loop.is_empty());
    }

    #[test]
    fn registration_requires_read_or_write_callback() {
        let mut event_loop = poll_loop(poll::MockBindings::new());

        let result = event_loop.register_fd(
            3,
            (),
            Callbacks::new().on_close(|_: &mut (), _: &mut EventLoop| ControlFlow::Continue(())),
        );

        assert!(matches!(result, Err(Error::MissingCallback { .. })));
        assert!(event_loop.is_empty());
    }

    #[test]
    fn invalid_identities_are_rejected_before_callbacks() {
        let log = new_log();
        let mut event_loop = wait_loop(wait::MockBindings::new());

        // Incomplete callback sets, to prove identity validation comes first.
        assert!(matches!(
            event_loop.register_fd(-1, (), Callbacks::new()),
            Err(Error::InvalidArgument {
                identity: Identity::Fd(-1)
            })
        ));
        assert!(matches!(
            event_loop.register_handle(Handle::from_raw(0), (), Callbacks::new()),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            event_loop.register_handle(Handle::from_raw(-1), (), reader(&log, "read", CONTINUE)),
            Err(Error::InvalidArgument { .. })
        ));

        assert!(event_loop.is_empty());
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn removing_unknown_source_is_not_found() {
        let log = new_log();
        let mut event_loop = poll_loop(poll::MockBindings::new());

        event_loop
            .register_fd(3, (), reader(&log, "read", CONTINUE))
            .unwrap();

        assert!(matches!(
            event_loop.remove_fd(4),
            Err(Error::NotFound {
                identity: Identity::Fd(4)
            })
        ));
        assert!(matches!(
            event_loop.remove_handle(Handle::from_raw(3)),
            Err(Error::NotFound { .. })
        ));
        assert_eq!(event_loop.len(), 1);
    }

    #[test]
    fn registrations_followed_by_removals_leave_loop_empty() {
        let log = new_log();
        let mut event_loop = poll_loop(poll::MockBindings::new());

        for fd in 0..10 {
            event_loop
                .register_fd(fd, (), reader(&log, "read", CONTINUE))
                .unwrap();
        }

        assert_eq!(event_loop.len(), 10);

        for fd in 0..10 {
            event_loop.remove_fd(fd).unwrap();
        }

        assert!(event_loop.is_empty());
        assert!(!event_loop.contains_fd(0));

        // Destroyed sources do not get their close callback.
        drop(event_loop);
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn duplicate_registrations_are_independent() {
        let log = new_log();
        let mut event_loop = poll_loop(poll::MockBindings::new());

        event_loop
            .register_fd(3, (), reader(&log, "first", CONTINUE))
            .unwrap();
        event_loop
            .register_fd(3, (), reader(&log, "second", CONTINUE))
            .unwrap();

        event_loop.remove_fd(3).unwrap();

        assert_eq!(event_loop.len(), 1);
        assert!(event_loop.contains_fd(3));
    }

    #[test]
    fn capacity_exceeded_leaves_registry_unchanged() {
        let log = new_log();
        let mut event_loop = wait_loop(wait::MockBindings::new());

        for raw in 1..=63 {
            event_loop
                .register_handle(Handle::from_raw(raw), (), reader(&log, "read", CONTINUE))
                .unwrap();
        }

        let result =
            event_loop.register_handle(Handle::from_raw(64), (), reader(&log, "read", CONTINUE));

        assert!(matches!(
            result,
            Err(Error::CapacityExceeded { capacity: 63 })
        ));
        assert_eq!(event_loop.len(), 63);
        assert!(!event_loop.contains_handle(Handle::from_raw(64)));
    }

    #[test]
    fn configured_capacity_is_enforced() {
        let log = new_log();
        let mut event_loop = EventLoop::builder()
            .strategy(StrategyFacade::from_poll_mock(poll::MockBindings::new()))
            .capacity(nz!(2))
            .build();

        event_loop
            .register_fd(1, (), reader(&log, "read", CONTINUE))
            .unwrap();
        event_loop
            .register_fd(2, (), reader(&log, "read", CONTINUE))
            .unwrap();

        assert!(matches!(
            event_loop.register_fd(3, (), reader(&log, "read", CONTINUE)),
            Err(Error::CapacityExceeded { capacity: 2 })
        ));

        event_loop.remove_fd(1).unwrap();
        event_loop
            .register_fd(3, (), reader(&log, "read", CONTINUE))
            .unwrap();
    }

    #[test]
    fn deferred_removal_frees_capacity_in_same_iteration() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .once()
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = EventLoop::builder()
            .strategy(StrategyFacade::from_poll_mock(bindings))
            .capacity(nz!(1))
            .build();

        let inner_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), event_loop: &mut EventLoop| {
                        inner_log.borrow_mut().push("1 read");
                        event_loop.remove_fd(1).unwrap();
                        event_loop
                            .register_fd(2, (), reader(&inner_log, "2 read", CONTINUE))
                            .unwrap();
                        ControlFlow::Break(())
                    })
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read"]);
        assert!(!event_loop.contains_fd(1));
        assert!(event_loop.contains_fd(2));
        assert_eq!(event_loop.len(), 1);
    }

    #[test]
    fn continue_then_stop_takes_two_iterations() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();
        let mut seq = Sequence::new();

        for _ in 0..2 {
            bindings
                .expect_poll()
                .withf(|requests| requests == [request(1, true, false), request(2, false, true)])
                .once()
                .in_sequence(&mut seq)
                .returning(|_| Ok(vec![Readiness::READABLE, Readiness::default()]));
        }

        let mut event_loop = poll_loop(bindings);

        let read_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                0_usize,
                Callbacks::new()
                    .on_read(move |reads: &mut usize, _| {
                        read_log.borrow_mut().push("A read");
                        *reads += 1;

                        if *reads == 2 {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    })
                    .on_close(logged_user(&log, "A close")),
            )
            .unwrap();

        event_loop
            .register_fd(
                2,
                (),
                Callbacks::new()
                    .on_write(logged(&log, "B write", CONTINUE))
                    .on_close(logged(&log, "B close", CONTINUE)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["A read", "A read"]);
        assert!(!event_loop.is_polling());
        assert_eq!(event_loop.len(), 2);
    }

    fn logged_user(log: &Log, entry: &'static str) -> Callback<usize> {
        let log = Rc::clone(log);

        Box::new(move |_: &mut usize, _: &mut EventLoop| {
            log.borrow_mut().push(entry);
            ControlFlow::Continue(())
        })
    }

    #[test]
    fn hangup_invokes_close_once_and_removes_source() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();
        let mut seq = Sequence::new();

        bindings
            .expect_poll()
            .withf(|requests| requests.len() == 2)
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::CLOSED, Readiness::READABLE]));

        bindings
            .expect_poll()
            .withf(|requests| requests == [request(2, true, false)])
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(logged(&log, "1 read", CONTINUE))
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        let reads = Rc::new(RefCell::new(0_usize));
        let read_log = Rc::clone(&log);
        event_loop
            .register_fd(
                2,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), _: &mut EventLoop| {
                        read_log.borrow_mut().push("2 read");
                        *reads.borrow_mut() += 1;

                        if *reads.borrow() == 2 {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    })
                    .on_close(logged(&log, "2 close", CONTINUE)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 close", "2 read", "2 read"]);
        assert!(!event_loop.contains_fd(1));
        assert_eq!(event_loop.len(), 1);
    }

    #[test]
    fn close_callback_may_remove_its_own_source() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .once()
            .returning(|_| Ok(vec![Readiness::CLOSED]));

        let mut event_loop = poll_loop(bindings);

        let close_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(logged(&log, "read", CONTINUE))
                    .on_close(move |_: &mut (), event_loop: &mut EventLoop| {
                        close_log.borrow_mut().push("close");
                        event_loop.remove_fd(1).unwrap();
                        ControlFlow::Break(())
                    }),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["close"]);
        assert!(event_loop.is_empty());
    }

    #[test]
    fn removing_sibling_does_not_skip_other_sources() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .once()
            .returning(|_| Ok(vec![Readiness::READABLE; 3]));

        let mut event_loop = poll_loop(bindings);

        let read_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), event_loop: &mut EventLoop| {
                        read_log.borrow_mut().push("1 read");
                        assert!(event_loop.is_polling());
                        event_loop.remove_fd(2).unwrap();
                        ControlFlow::Continue(())
                    })
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        event_loop
            .register_fd(2, (), reader(&log, "2 read", CONTINUE))
            .unwrap();
        event_loop
            .register_fd(3, (), reader(&log, "3 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read", "3 read"]);
        assert!(!event_loop.contains_fd(2));
        assert_eq!(event_loop.len(), 2);
    }

    #[test]
    fn removing_self_skips_remaining_callbacks_of_source() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings.expect_poll().once().returning(|_| {
            Ok(vec![
                Readiness {
                    readable: true,
                    writable: true,
                    closed: false,
                },
                Readiness::READABLE,
            ])
        });

        let mut event_loop = poll_loop(bindings);

        let read_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), event_loop: &mut EventLoop| {
                        read_log.borrow_mut().push("1 read");
                        event_loop.remove_fd(1).unwrap();
                        ControlFlow::Continue(())
                    })
                    .on_write(logged(&log, "1 write", CONTINUE))
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        event_loop
            .register_fd(2, (), reader(&log, "2 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read", "2 read"]);
        assert_eq!(event_loop.len(), 1);
    }

    #[test]
    fn source_removed_in_callback_is_not_watched_next_iteration() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();
        let mut seq = Sequence::new();

        bindings
            .expect_poll()
            .withf(|requests| requests == [request(1, true, false), request(2, true, false)])
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::READABLE, Readiness::default()]));

        bindings
            .expect_poll()
            .withf(|requests| requests == [request(2, true, false)])
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        let read_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), event_loop: &mut EventLoop| {
                        read_log.borrow_mut().push("1 read");
                        event_loop.remove_fd(1).unwrap();
                        ControlFlow::Continue(())
                    })
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        event_loop
            .register_fd(2, (), reader(&log, "2 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read", "2 read"]);
        assert!(!event_loop.contains_fd(1));
        assert_eq!(event_loop.len(), 1);
    }

    #[test]
    fn source_registered_in_callback_is_watched_next_iteration() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();
        let mut seq = Sequence::new();

        bindings
            .expect_poll()
            .withf(|requests| requests == [request(1, true, false)])
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::READABLE]));

        bindings
            .expect_poll()
            .withf(|requests| requests == [request(1, true, false), request(9, true, false)])
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::default(), Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        let inner_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), event_loop: &mut EventLoop| {
                        inner_log.borrow_mut().push("1 read");

                        if !event_loop.contains_fd(9) {
                            event_loop
                                .register_fd(9, (), reader(&inner_log, "9 read", BREAK))
                                .unwrap();
                        }

                        ControlFlow::Continue(())
                    })
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read", "9 read"]);
        assert_eq!(event_loop.len(), 2);
    }

    #[test]
    fn source_registered_by_stopping_callback_is_never_dispatched() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .once()
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        let inner_log = Rc::clone(&log);
        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), event_loop: &mut EventLoop| {
                        inner_log.borrow_mut().push("1 read");
                        event_loop
                            .register_fd(9, (), reader(&inner_log, "9 read", CONTINUE))
                            .unwrap();
                        ControlFlow::Break(())
                    })
                    .on_close(logged(&log, "1 close", CONTINUE)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read"]);
        assert!(event_loop.contains_fd(9));
    }

    #[test]
    fn stop_on_poll_skips_rest_of_wake() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .once()
            .returning(|_| Ok(vec![Readiness::READABLE; 2]));

        let mut event_loop = poll_loop(bindings);

        event_loop
            .register_fd(1, (), reader(&log, "1 read", BREAK))
            .unwrap();
        event_loop
            .register_fd(2, (), reader(&log, "2 read", CONTINUE))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read"]);
    }

    #[test]
    fn wait_errors_are_retried() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();
        let mut seq = Sequence::new();

        bindings
            .expect_poll()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Err(io::Error::from(io::ErrorKind::Interrupted)));
        bindings
            .expect_poll()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        bindings
            .expect_poll()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        event_loop
            .register_fd(1, (), reader(&log, "1 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read"]);
    }

    #[test]
    fn side_channel_is_never_invoked_on_poll() {
        let log = new_log();
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .once()
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        event_loop.set_side_channel_callback(logged_loop(&log, "side", CONTINUE));
        event_loop
            .register_fd(1, (), reader(&log, "1 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["1 read"]);
    }

    fn logged_loop(
        log: &Log,
        entry: &'static str,
        flow: ControlFlow<()>,
    ) -> SideChannelCallback {
        let log = Rc::clone(log);

        Box::new(move |_: &mut EventLoop| {
            log.borrow_mut().push(entry);
            flow
        })
    }

    #[test]
    fn all_signaled_objects_are_dispatched_in_one_wake() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_wait_for_any()
            .withf(|handles, wake| handles.len() == 2 && !*wake)
            .once()
            .returning(|_, _| Ok(Some(0)));

        // The winner is never probed; only the second object is.
        bindings
            .expect_is_signaled()
            .with(eq(Handle::from_raw(11)))
            .once()
            .returning(|_| Ok(true));

        let mut event_loop = wait_loop(bindings);

        event_loop
            .register_handle(Handle::from_raw(10), (), reader(&log, "10 read", CONTINUE))
            .unwrap();
        event_loop
            .register_handle(Handle::from_raw(11), (), reader(&log, "11 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["10 read", "11 read"]);
    }

    #[test]
    fn stop_on_wait_still_drains_wake() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_wait_for_any()
            .once()
            .returning(|_, _| Ok(Some(1)));
        bindings
            .expect_is_signaled()
            .with(eq(Handle::from_raw(10)))
            .once()
            .returning(|_| Ok(true));

        let mut event_loop = wait_loop(bindings);

        event_loop
            .register_handle(Handle::from_raw(10), (), reader(&log, "10 read", BREAK))
            .unwrap();
        event_loop
            .register_handle(Handle::from_raw(11), (), reader(&log, "11 read", CONTINUE))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["10 read", "11 read"]);
    }

    #[test]
    fn side_channel_runs_first_and_again_after_final_iteration() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();
        let mut seq = Sequence::new();

        bindings
            .expect_wait_for_any()
            .withf(|_, wake| *wake)
            .times(2)
            .returning(|_, _| Ok(Some(0)));
        bindings
            .expect_side_channel_pending()
            .once()
            .in_sequence(&mut seq)
            .return_const(true);
        bindings
            .expect_side_channel_pending()
            .once()
            .in_sequence(&mut seq)
            .return_const(false);

        let mut event_loop = wait_loop(bindings);

        event_loop.set_side_channel_callback(logged_loop(&log, "side", CONTINUE));

        let reads = Rc::new(RefCell::new(0_usize));
        let read_log = Rc::clone(&log);
        event_loop
            .register_handle(
                Handle::from_raw(10),
                (),
                Callbacks::new()
                    .on_read(move |_: &mut (), _: &mut EventLoop| {
                        read_log.borrow_mut().push("10 read");
                        *reads.borrow_mut() += 1;

                        if *reads.borrow() == 2 {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    })
                    .on_close(logged(&log, "10 close", CONTINUE)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["side", "10 read", "10 read", "side"]);
    }

    #[test]
    fn side_channel_serviced_in_final_iteration_is_not_repeated() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_wait_for_any()
            .once()
            .returning(|_, _| Ok(Some(0)));
        bindings.expect_side_channel_pending().return_const(true);

        let mut event_loop = wait_loop(bindings);

        event_loop.set_side_channel_callback(logged_loop(&log, "side", CONTINUE));
        event_loop
            .register_handle(Handle::from_raw(10), (), reader(&log, "10 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["side", "10 read"]);
    }

    #[test]
    fn side_channel_can_remove_ready_source() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_wait_for_any()
            .once()
            .returning(|_, _| Ok(Some(0)));
        bindings
            .expect_is_signaled()
            .with(eq(Handle::from_raw(11)))
            .once()
            .returning(|_| Ok(true));
        bindings.expect_side_channel_pending().return_const(true);

        let mut event_loop = wait_loop(bindings);

        let side_log = Rc::clone(&log);
        event_loop.set_side_channel_callback(move |event_loop: &mut EventLoop| {
            side_log.borrow_mut().push("side");
            event_loop.remove_handle(Handle::from_raw(10)).unwrap();
            ControlFlow::Continue(())
        });

        event_loop
            .register_handle(Handle::from_raw(10), (), reader(&log, "10 read", CONTINUE))
            .unwrap();
        event_loop
            .register_handle(Handle::from_raw(11), (), reader(&log, "11 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["side", "11 read"]);
        assert!(!event_loop.contains_handle(Handle::from_raw(10)));
    }

    #[test]
    fn cleared_side_channel_is_not_waited_for() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_wait_for_any()
            .withf(|_, wake| !*wake)
            .once()
            .returning(|_, _| Ok(Some(0)));

        let mut event_loop = wait_loop(bindings);

        event_loop.set_side_channel_callback(logged_loop(&log, "side", CONTINUE));
        event_loop.clear_side_channel_callback();
        event_loop
            .register_handle(Handle::from_raw(10), (), reader(&log, "10 read", BREAK))
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["10 read"]);
    }

    #[test]
    fn socket_error_closes_source_and_releases_event() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_create_event()
            .once()
            .returning(|| Ok(Handle::from_raw(50)));
        bindings
            .expect_select_network_events()
            .with(
                eq(5),
                eq(Handle::from_raw(50)),
                eq(Interest {
                    readable: true,
                    writable: false,
                }),
            )
            .once()
            .returning(|_, _, _| Ok(()));
        bindings
            .expect_wait_for_any()
            .withf(|handles, _| handles == [Handle::from_raw(50)])
            .once()
            .returning(|_, _| Ok(Some(0)));
        bindings
            .expect_enum_network_events()
            .once()
            .returning(|_, _| {
                Ok(NetworkEvents {
                    read: true,
                    read_error: true,
                    ..NetworkEvents::default()
                })
            });
        bindings
            .expect_close_event()
            .with(eq(Handle::from_raw(50)))
            .once()
            .return_const(());

        let mut event_loop = wait_loop(bindings);

        event_loop
            .register_fd(
                5,
                (),
                Callbacks::new()
                    .on_read(logged(&log, "5 read", CONTINUE))
                    .on_close(logged(&log, "5 close", BREAK)),
            )
            .unwrap();

        event_loop.run();

        assert_eq!(entries(&log), ["5 close"]);
        assert!(event_loop.is_empty());
    }

    #[test]
    fn idle_removal_releases_socket_event_immediately() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_create_event()
            .returning(|| Ok(Handle::from_raw(50)));
        bindings
            .expect_select_network_events()
            .returning(|_, _, _| Ok(()));
        bindings
            .expect_close_event()
            .with(eq(Handle::from_raw(50)))
            .once()
            .return_const(());

        let mut event_loop = wait_loop(bindings);

        event_loop
            .register_fd(5, (), reader(&log, "5 read", CONTINUE))
            .unwrap();
        event_loop.remove_fd(5).unwrap();

        assert!(event_loop.is_empty());
    }

    #[test]
    fn failed_attachment_leaves_registry_unchanged() {
        let log = new_log();
        let mut bindings = wait::MockBindings::new();

        bindings
            .expect_create_event()
            .returning(|| Err(io::Error::from(io::ErrorKind::OutOfMemory)));

        let mut event_loop = wait_loop(bindings);

        assert!(matches!(
            event_loop.register_fd(5, (), reader(&log, "5 read", CONTINUE)),
            Err(Error::AllocationFailed {
                identity: Identity::Fd(5),
                ..
            })
        ));
        assert!(event_loop.is_empty());
    }

    #[test]
    fn drop_invokes_close_of_remaining_sources_once() {
        let log = new_log();
        let mut event_loop = poll_loop(poll::MockBindings::new());

        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(logged(&log, "1 read", CONTINUE))
                    .on_close(logged(&log, "1 close", BREAK)),
            )
            .unwrap();
        event_loop
            .register_fd(
                2,
                (),
                Callbacks::new()
                    .on_read(logged(&log, "2 read", CONTINUE))
                    .on_close(logged(&log, "2 close", CONTINUE)),
            )
            .unwrap();

        drop(event_loop);

        assert_eq!(entries(&log), ["1 close", "2 close"]);
    }

    #[test]
    #[should_panic]
    fn run_from_callback_panics() {
        let mut bindings = poll::MockBindings::new();

        bindings
            .expect_poll()
            .returning(|_| Ok(vec![Readiness::READABLE]));

        let mut event_loop = poll_loop(bindings);

        event_loop
            .register_fd(
                1,
                (),
                Callbacks::new()
                    .on_read(|_: &mut (), event_loop: &mut EventLoop| {
                        event_loop.run();
                        ControlFlow::Break(())
                    })
                    .on_close(|_: &mut (), _: &mut EventLoop| ControlFlow::Continue(())),
            )
            .unwrap();

        event_loop.run();
    }
}
