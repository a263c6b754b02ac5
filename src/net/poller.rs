//! net/poller.rs
//!
//! Readiness backends for the multiplexer. Production uses mio over raw
//! descriptors; tests script their own.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Poll, Token, Waker};

use super::multiplexer::{Interest, ObserverId, Readiness};

// -----------------------------------------------------------------------------
// ----- Poller ----------------------------------------------------------------

pub trait Poller: Send {
    /// Move a descriptor from `previous` to `next` interest. `NONE` on either
    /// side means "not attached".
    fn apply(
        &mut self,
        owner: ObserverId,
        fd: RawFd,
        previous: Interest,
        next: Interest,
    ) -> io::Result<()>;

    /// Block until something is ready or `timeout` elapses.
    fn wait(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<(ObserverId, Readiness)>,
    ) -> io::Result<()>;
}

// -----------------------------------------------------------------------------
// ----- MioPoller -------------------------------------------------------------

const WAKE_TOKEN: Token = Token(usize::MAX);

const EVENTS_CAPACITY: usize = 1024;

pub struct MioPoller {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl MioPoller {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            waker,
        })
    }

    /// Interrupts a blocked `wait` from another thread.
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }
}

impl Poller for MioPoller {
    fn apply(
        &mut self,
        owner: ObserverId,
        fd: RawFd,
        previous: Interest,
        next: Interest,
    ) -> io::Result<()> {
        let registry = self.poll.registry();
        let token = Token(owner.0);

        match (to_mio(previous), to_mio(next)) {
            (None, None) => Ok(()),
            (None, Some(i)) => registry.register(&mut SourceFd(&fd), token, i),
            (Some(_), Some(i)) => registry.reregister(&mut SourceFd(&fd), token, i),
            (Some(_), None) => registry.deregister(&mut SourceFd(&fd)),
        }
    }

    fn wait(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<(ObserverId, Readiness)>,
    ) -> io::Result<()> {
        self.poll.poll(&mut self.events, timeout)?;

        for event in self.events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }

            let mut readiness = Readiness::NONE;
            if event.is_readable() || event.is_read_closed() {
                readiness |= Readiness::READABLE;
            }
            if event.is_writable() || event.is_write_closed() {
                readiness |= Readiness::WRITABLE;
            }
            if event.is_error() {
                readiness |= Readiness::EXCEPTIONAL;
            }

            ready.push((ObserverId(event.token().0), readiness));
        }
        Ok(())
    }
}

// mio reports errors on every registration and has no except-only interest,
// so a mask without READ or WRITE leaves the descriptor detached.
fn to_mio(interest: Interest) -> Option<mio::Interest> {
    match (
        interest.contains(Interest::READ),
        interest.contains(Interest::WRITE),
    ) {
        (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
        (true, false) => Some(mio::Interest::READABLE),
        (false, true) => Some(mio::Interest::WRITABLE),
        (false, false) => None,
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
