#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A single-threaded readiness dispatch loop over file descriptors, sockets and waitable platform
//! handles.
//!
//! Register event sources with an [`EventLoop`], each with a user value and a set of
//! [`Callbacks`], then call [`EventLoop::run()`]. The loop blocks until sources become ready and
//! invokes their read, write or close callbacks until one of the callbacks returns
//! [`ControlFlow::Break`][std::ops::ControlFlow::Break].
//!
//! ```no_run
//! # #[cfg(unix)]
//! # fn main() -> event_pump::Result<()> {
//! use std::io::Read;
//! use std::ops::ControlFlow;
//! use std::os::fd::AsRawFd;
//! use std::os::unix::net::UnixStream;
//!
//! use event_pump::{Callbacks, EventLoop};
//!
//! let (stream, _peer) = UnixStream::pair().unwrap();
//! let fd = stream.as_raw_fd();
//!
//! let mut event_loop = EventLoop::new();
//!
//! event_loop.register_fd(
//!     fd,
//!     stream,
//!     Callbacks::new()
//!         .on_read(|stream: &mut UnixStream, _| {
//!             let mut buffer = [0_u8; 512];
//!
//!             match stream.read(&mut buffer) {
//!                 Ok(0) | Err(_) => ControlFlow::Break(()),
//!                 Ok(_) => ControlFlow::Continue(()),
//!             }
//!         })
//!         .on_close(|_, _| ControlFlow::Break(())),
//! )?;
//!
//! event_loop.run();
//! # Ok(())
//! # }
//! # #[cfg(not(unix))]
//! # fn main() {}
//! ```
//!
//! # Platform behavior
//!
//! On Unix, readiness is detected with `poll(2)`. Any number of sources can be registered.
//!
//! On Windows, readiness is detected with `MsgWaitForMultipleObjects()`, which limits the event
//! loop to 63 sources. Sockets are watched through event objects, which switches them into
//! non-blocking mode. The event loop can also wake up for raw input arriving in the message queue
//! of the thread running it, see [`EventLoop::set_side_channel_callback()`].

mod builder;
mod callbacks;
mod error;
mod event_loop;
mod pal;
mod registry;
mod source;

pub use builder::*;
pub use callbacks::*;
pub use error::*;
pub use event_loop::*;
pub(crate) use registry::*;
pub use source::*;
