use std::io;

use thiserror::Error;

use crate::Identity;

/// Errors that can occur when registering, removing or waiting on event sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity of the source is not usable: a negative file descriptor or a null/invalid
    /// platform handle.
    #[error("{identity} is not a valid source identity")]
    InvalidArgument {
        /// The identity that was rejected.
        identity: Identity,
    },

    /// The callback set does not satisfy the registration requirements. A close callback is
    /// mandatory and at least one of the read and write callbacks must be present.
    #[error("incomplete callback set: {requirement}")]
    MissingCallback {
        /// A human-readable description of the requirement that was not met.
        requirement: &'static str,
    },

    /// The platform wait primitive cannot watch any more objects.
    #[error("cannot register more than {capacity} sources")]
    CapacityExceeded {
        /// The maximum number of sources the event loop accepts.
        capacity: usize,
    },

    /// The platform state backing the source (e.g. a socket event object) could not be created.
    #[error("could not create platform state for {identity}")]
    AllocationFailed {
        /// The identity of the source being registered.
        identity: Identity,

        /// The error reported by the operating system.
        #[source]
        source: io::Error,
    },

    /// The operating system refused to deliver readiness notifications for the source.
    #[error("could not subscribe {identity} to readiness notifications")]
    SubscriptionFailed {
        /// The identity of the source being registered.
        identity: Identity,

        /// The error reported by the operating system.
        #[source]
        source: io::Error,
    },

    /// No source with the given identity is registered.
    #[error("no source is registered for {identity}")]
    NotFound {
        /// The identity that was looked up.
        identity: Identity,
    },

    /// The blocking readiness wait failed for a reason other than interruption.
    ///
    /// The event loop never returns this from [`EventLoop::run()`][crate::EventLoop::run]; it is
    /// reported through `tracing` and the wait is retried.
    #[error("readiness wait failed")]
    WaitPrimitiveFailed {
        /// The error reported by the operating system.
        #[source]
        source: io::Error,
    },
}

/// A specialized `Result` type for event loop operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
