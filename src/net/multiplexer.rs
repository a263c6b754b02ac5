//! net/multiplexer.rs
//!
//! Readiness multiplexer. Owns one registration per live association, turns
//! poll results and expired idle budgets into a FIFO of events, and hands
//! them out strictly one at a time.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use tracing::debug;

use super::poller::Poller;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Interrupted waits are retried this many times before the loop gives up.
pub const MAX_POLL_ATTEMPTS: usize = 10;

// -----------------------------------------------------------------------------
// ----- ObserverId ------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub usize);

// -----------------------------------------------------------------------------
// ----- Interest --------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(1);
    pub const WRITE: Interest = Interest(2);
    pub const EXCEPT: Interest = Interest(4);

    pub fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

// -----------------------------------------------------------------------------
// ----- Readiness -------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness(u8);

impl Readiness {
    pub const NONE: Readiness = Readiness(0);
    pub const READABLE: Readiness = Readiness(1);
    pub const WRITABLE: Readiness = Readiness(2);
    pub const EXCEPTIONAL: Readiness = Readiness(4);
    pub const TIMED_OUT: Readiness = Readiness(8);

    pub fn contains(self, other: Readiness) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Readiness) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Drop kinds the observer did not ask for. Errors always get through.
    fn masked(self, interest: Interest) -> Readiness {
        let mut out = self.0 & Readiness::EXCEPTIONAL.0;
        if interest.contains(Interest::READ) {
            out |= self.0 & Readiness::READABLE.0;
        }
        if interest.contains(Interest::WRITE) {
            out |= self.0 & Readiness::WRITABLE.0;
        }
        Readiness(out)
    }
}

impl BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

// -----------------------------------------------------------------------------
// ----- Event / Progress ------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub owner: ObserverId,
    pub readiness: Readiness,
}

#[derive(Debug)]
pub enum Progress {
    /// Exactly one event, to be handled before the next `run_once`.
    Dispatch(Event),
    /// The wait returned without anything to deliver (wake-up, spurious).
    Quiet,
    /// Nothing registered and nothing queued.
    Idle,
    Failed(io::Error),
}

// -----------------------------------------------------------------------------
// ----- Multiplexer -----------------------------------------------------------

#[derive(Debug)]
struct Registration {
    fd: RawFd,
    interest: Interest,
    timeout: Option<Duration>,
    last_activity: Instant,
}

pub struct Multiplexer {
    poller: Box<dyn Poller>,
    observers: BTreeMap<ObserverId, Registration>,
    queue: VecDeque<Event>,
    ready: Vec<(ObserverId, Readiness)>,
    next_id: usize,
}

// -----------------------------------------------------------------------------
// ----- Multiplexer: Static ---------------------------------------------------

impl Multiplexer {
    pub fn new(poller: Box<dyn Poller>) -> Self {
        Self {
            poller,
            observers: BTreeMap::new(),
            queue: VecDeque::new(),
            ready: Vec::new(),
            next_id: 0,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Multiplexer: Public ---------------------------------------------------

impl Multiplexer {
    /// Ids are never reused, so a stale id can only ever miss.
    pub fn register(&mut self, fd: RawFd) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;

        self.observers.insert(
            id,
            Registration {
                fd,
                interest: Interest::NONE,
                timeout: None,
                last_activity: Instant::now(),
            },
        );
        id
    }

    pub fn set_interest(&mut self, owner: ObserverId, interest: Interest) -> io::Result<()> {
        let Some(reg) = self.observers.get_mut(&owner) else {
            return Ok(());
        };
        if reg.interest == interest {
            return Ok(());
        }

        self.poller.apply(owner, reg.fd, reg.interest, interest)?;
        reg.interest = interest;
        Ok(())
    }

    /// Restarts the idle budget. A zero timeout disables it.
    pub fn set_timeout(&mut self, owner: ObserverId, timeout: Option<Duration>) {
        if let Some(reg) = self.observers.get_mut(&owner) {
            reg.timeout = timeout.filter(|t| !t.is_zero());
            reg.last_activity = Instant::now();
        }
    }

    pub fn deregister(&mut self, owner: ObserverId) -> bool {
        let Some(reg) = self.observers.remove(&owner) else {
            return false;
        };

        if let Err(e) = self.poller.apply(owner, reg.fd, reg.interest, Interest::NONE) {
            debug!("detaching observer {} failed: {e}", owner.0);
        }

        self.queue.retain(|ev| ev.owner != owner);
        true
    }

    pub fn deregister_all(&mut self) {
        let owners: Vec<ObserverId> = self.observers.keys().copied().collect();
        for owner in owners {
            self.deregister(owner);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn is_registered(&self, owner: ObserverId) -> bool {
        self.observers.contains_key(&owner)
    }

    pub fn run_once(&mut self) -> Progress {
        if let Some(ev) = self.queue.pop_front() {
            return Progress::Dispatch(ev);
        }
        if self.observers.is_empty() {
            return Progress::Idle;
        }

        let timeout = self.next_timeout(Instant::now());

        let mut attempts = 0;
        loop {
            self.ready.clear();
            match self.poller.wait(timeout, &mut self.ready) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    attempts += 1;
                    if attempts >= MAX_POLL_ATTEMPTS {
                        return Progress::Failed(e);
                    }
                }
                Err(e) => return Progress::Failed(e),
            }
        }

        self.collect(Instant::now());

        match self.queue.pop_front() {
            Some(ev) => Progress::Dispatch(ev),
            None => Progress::Quiet,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Multiplexer: Private --------------------------------------------------

impl Multiplexer {
    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.observers
            .values()
            .filter_map(|reg| {
                let timeout = reg.timeout?;
                Some(timeout.saturating_sub(now.saturating_duration_since(reg.last_activity)))
            })
            .min()
    }

    fn collect(&mut self, now: Instant) {
        let mut fired = BTreeSet::new();

        for (owner, readiness) in self.ready.drain(..) {
            let Some(reg) = self.observers.get_mut(&owner) else {
                continue;
            };
            let readiness = readiness.masked(reg.interest);
            if readiness.is_empty() {
                continue;
            }

            reg.last_activity = now;
            fired.insert(owner);
            self.queue.push_back(Event { owner, readiness });
        }

        for (&owner, reg) in self.observers.iter_mut() {
            let Some(timeout) = reg.timeout else {
                continue;
            };
            if fired.contains(&owner) {
                continue;
            }
            if now.saturating_duration_since(reg.last_activity) >= timeout {
                reg.last_activity = now;
                self.queue.push_back(Event {
                    owner,
                    readiness: Readiness::TIMED_OUT,
                });
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
