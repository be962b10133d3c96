//! Readiness-bitmask polling via `poll(2)`, used on Unix platforms.

mod bindings;
mod strategy;

pub(crate) use bindings::*;
pub(crate) use strategy::*;
