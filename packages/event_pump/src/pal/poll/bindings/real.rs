use std::fmt::Debug;
use std::io;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, c_short, nfds_t, pollfd};

use crate::Interest;
use crate::pal::Readiness;
use crate::pal::poll::{Bindings, PollRequest};

/// FFI bindings that target the real operating system that the build is targeting.
///
/// You would only use different bindings in PAL unit tests that need to use mock bindings.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

// Exercised via the pipe integration tests; error paths require OS-level failures.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Bindings for BuildTargetBindings {
    fn poll(&self, requests: &[PollRequest]) -> io::Result<Vec<Readiness>> {
        let mut fds = requests
            .iter()
            .map(|request| pollfd {
                fd: request.fd,
                events: events_for(request.interest),
                revents: 0,
            })
            .collect::<Vec<_>>();

        let nfds = nfds_t::try_from(fds.len()).map_err(io::Error::other)?;

        // SAFETY: `fds` holds `nfds` initialized entries and outlives the call.
        let result = unsafe { libc::poll(fds.as_mut_ptr(), nfds, -1) };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(fds
            .iter()
            .map(|fd| readiness_from_revents(fd.revents))
            .collect())
    }
}

fn events_for(interest: Interest) -> c_short {
    let mut events = 0;

    if interest.readable {
        events |= POLLIN;
    }

    if interest.writable {
        events |= POLLOUT;
    }

    events
}

fn readiness_from_revents(revents: c_short) -> Readiness {
    Readiness {
        readable: revents & POLLIN != 0,
        writable: revents & POLLOUT != 0,
        closed: revents & (POLLERR | POLLHUP | POLLNVAL) != 0,
    }
}
