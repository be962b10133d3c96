mod abstractions;
mod facade;
#[cfg(windows)]
mod real;

pub(crate) use abstractions::*;
pub(crate) use facade::*;
#[cfg(windows)]
pub(crate) use real::*;
