//! Multi-object wait via `MsgWaitForMultipleObjects()`, used on Windows.

mod bindings;
mod strategy;

pub(crate) use bindings::*;
pub(crate) use strategy::*;
