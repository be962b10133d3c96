mod abstractions;
mod facade;
#[cfg(unix)]
mod real;

pub(crate) use abstractions::*;
pub(crate) use facade::*;
#[cfg(unix)]
pub(crate) use real::*;
