//! Platform Abstraction Layer (PAL). Everything that touches the operating system goes through
//! a [`Strategy`], which in turn goes through mockable bindings.

mod abstractions;
pub(crate) use abstractions::*;

mod facade;
pub(crate) use facade::*;

// Both strategies are compiled in test mode on every platform so their logic can be exercised
// against mock bindings. They are accessed via their module path to avoid name clashes.
#[cfg(any(unix, test))]
pub(crate) mod poll;
#[cfg(any(unix, test))]
pub(crate) use poll::PollStrategy;

#[cfg(any(windows, test))]
pub(crate) mod wait;
#[cfg(any(windows, test))]
pub(crate) use wait::WaitStrategy;

#[cfg(not(any(unix, windows)))]
compile_error!("event_pump supports only Unix and Windows targets");
