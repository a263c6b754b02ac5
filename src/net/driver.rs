//! net/driver.rs
//!
//! The event loop. `Reactor` owns the multiplexer and every association and
//! is what handlers see as `Links`; `Driver` pairs it with one handler and
//! turns multiplexer events into handler callbacks.

use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use mio::Waker;
use tracing::{debug, error, info, warn};

use super::association::{AssocState, Association, ReadOutcome};
use super::error::NetError;
use super::links::{AssocId, AssociationHandler, Links};
use super::multiplexer::{Event, Multiplexer, Progress, Readiness};
use super::poller::MioPoller;

// -----------------------------------------------------------------------------
// ----- Reactor ---------------------------------------------------------------

pub struct Reactor {
    mux: Multiplexer,
    assocs: HashMap<AssocId, Association>,
    graveyard: Vec<AssocId>,
    failed: VecDeque<AssocId>,
}

// -----------------------------------------------------------------------------
// ----- Reactor: Public -------------------------------------------------------

impl Reactor {
    pub fn listen(&mut self, addr: SocketAddr) -> Result<(AssocId, SocketAddr), NetError> {
        let assoc = Association::listen(addr)?;
        let local = assoc.local_addr()?;
        let id = self.add(assoc)?;
        Ok((id, local))
    }

    pub fn len(&self) -> usize {
        self.assocs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assocs.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- Reactor: Private ------------------------------------------------------

impl Reactor {
    fn add(&mut self, assoc: Association) -> Result<AssocId, NetError> {
        let fd = assoc
            .raw_fd()
            .ok_or_else(|| NetError::Io(std::io::ErrorKind::NotConnected.into()))?;

        let owner = self.mux.register(fd);
        if let Err(e) = self.mux.set_interest(owner, assoc.interest()) {
            self.mux.deregister(owner);
            return Err(e.into());
        }

        let id = AssocId::from(owner);
        self.assocs.insert(id, assoc);
        Ok(id)
    }

    fn sync_interest(&mut self, id: AssocId) {
        let Some(assoc) = self.assocs.get(&id) else {
            return;
        };
        if let Err(e) = self.mux.set_interest(id.into(), assoc.interest()) {
            debug!("interest update for {} failed: {e}", id.0);
            self.fail(id);
        }
    }

    fn flush(&mut self, id: AssocId) {
        let Some(assoc) = self.assocs.get_mut(&id) else {
            return;
        };
        if let Err(e) = assoc.flush() {
            debug!("write on {} failed: {e}", id.0);
            self.fail(id);
            return;
        }

        if assoc.should_close() {
            self.fail(id);
        } else {
            self.sync_interest(id);
        }
    }

    /// Close the transport and queue an `on_failed` for the handler.
    fn fail(&mut self, id: AssocId) {
        if self.shut(id) {
            self.failed.push_back(id);
        }
    }

    /// Deregister before releasing, the registration still needs the fd.
    fn shut(&mut self, id: AssocId) -> bool {
        let Some(assoc) = self.assocs.get_mut(&id) else {
            return false;
        };
        if assoc.is_closed() {
            return false;
        }

        self.mux.deregister(id.into());
        assoc.release();
        self.graveyard.push(id);
        true
    }

    fn reap(&mut self) {
        for id in self.graveyard.drain(..) {
            self.assocs.remove(&id);
        }
    }

    fn shutdown(&mut self) {
        self.mux.deregister_all();
        self.assocs.clear();
        self.graveyard.clear();
        self.failed.clear();
    }
}

// -----------------------------------------------------------------------------
// ----- Reactor: Links --------------------------------------------------------

impl Links for Reactor {
    fn connect(&mut self, addr: &str) -> Result<AssocId, NetError> {
        let resolved = resolve(addr)?;
        let assoc = Association::connect(resolved)?;
        let id = self.add(assoc)?;
        debug!("connecting {} to {addr} ({resolved})", id.0);
        Ok(id)
    }

    fn send(&mut self, id: AssocId, frame: Bytes) {
        let Some(assoc) = self.assocs.get_mut(&id) else {
            return;
        };
        if assoc.is_closed() {
            return;
        }

        assoc.enqueue(frame);
        self.flush(id);
    }

    fn close(&mut self, id: AssocId) {
        self.shut(id);
    }

    fn destroy(&mut self, id: AssocId) {
        if !self.shut(id) && self.assocs.contains_key(&id) && !self.graveyard.contains(&id) {
            self.graveyard.push(id);
        }
    }

    fn close_after_flush(&mut self, id: AssocId) {
        let Some(assoc) = self.assocs.get_mut(&id) else {
            return;
        };
        assoc.request_close_after_flush();
        if assoc.should_close() {
            self.fail(id);
        }
    }

    fn set_idle_timeout(&mut self, id: AssocId, timeout: Option<Duration>) {
        self.mux.set_timeout(id.into(), timeout);
    }

    fn listener_of(&self, id: AssocId) -> Option<AssocId> {
        self.assocs.get(&id).and_then(Association::listener)
    }
}

// -----------------------------------------------------------------------------
// ----- Driver ----------------------------------------------------------------

pub struct Driver<H: AssociationHandler> {
    reactor: Reactor,
    handler: H,
    waker: Arc<Waker>,
}

// -----------------------------------------------------------------------------
// ----- Driver: Static --------------------------------------------------------

impl<H: AssociationHandler> Driver<H> {
    pub fn new(handler: H) -> Result<Self, NetError> {
        let poller = MioPoller::new()?;
        let waker = poller.waker();

        Ok(Self {
            reactor: Reactor {
                mux: Multiplexer::new(Box::new(poller)),
                assocs: HashMap::new(),
                graveyard: Vec::new(),
                failed: VecDeque::new(),
            },
            handler,
            waker,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Driver: Public --------------------------------------------------------

impl<H: AssociationHandler> Driver<H> {
    pub fn listen(&mut self, addr: SocketAddr) -> Result<(AssocId, SocketAddr), NetError> {
        self.reactor.listen(addr)
    }

    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Run `f` with the handler and the links it would see in a callback.
    pub fn with_handler<R>(&mut self, f: impl FnOnce(&mut H, &mut dyn Links) -> R) -> R {
        let out = f(&mut self.handler, &mut self.reactor);
        self.deliver_failures();
        out
    }

    /// Loop until `shutdown` is set, the loop runs out of associations, or
    /// polling fails for good. `checkpoint` runs at the top of every round,
    /// the only place where outside state (configuration) is taken in.
    pub fn run(
        &mut self,
        shutdown: &AtomicBool,
        mut checkpoint: impl FnMut(&mut H, &mut dyn Links),
    ) -> Result<(), NetError> {
        let result = loop {
            self.reactor.reap();

            if shutdown.load(Ordering::Relaxed) {
                info!("event loop stopping on request");
                break Ok(());
            }

            checkpoint(&mut self.handler, &mut self.reactor);
            self.deliver_failures();

            match self.reactor.mux.run_once() {
                Progress::Dispatch(event) => self.dispatch(event),
                Progress::Quiet => {}
                Progress::Idle => {
                    info!("event loop has nothing left to watch");
                    break Ok(());
                }
                Progress::Failed(e) => {
                    error!("readiness poll failed: {e}");
                    break Err(NetError::Poll(e));
                }
            }

            self.deliver_failures();
        };

        self.reactor.shutdown();
        result
    }
}

// -----------------------------------------------------------------------------
// ----- Driver: Private -------------------------------------------------------

impl<H: AssociationHandler> Driver<H> {
    fn dispatch(&mut self, event: Event) {
        let id = AssocId::from(event.owner);
        let Some(assoc) = self.reactor.assocs.get(&id) else {
            return;
        };

        if event.readiness.contains(Readiness::TIMED_OUT) {
            if !assoc.is_closed() {
                self.handler.on_timed_out(&mut self.reactor, id);
            }
            return;
        }

        match assoc.state() {
            AssocState::Closed => {}
            AssocState::Listening => self.accept_all(id),
            AssocState::Connecting => self.finish_connect(id),
            AssocState::Accepting | AssocState::Ready | AssocState::Writing => {
                if event.readiness.contains(Readiness::WRITABLE) {
                    self.reactor.flush(id);
                }
                if event
                    .readiness
                    .intersects(Readiness::READABLE | Readiness::EXCEPTIONAL)
                {
                    self.read(id);
                }
            }
        }
    }

    fn accept_all(&mut self, listener: AssocId) {
        loop {
            let Some(assoc) = self.reactor.assocs.get_mut(&listener) else {
                return;
            };

            let (stream, peer) = match assoc.accept() {
                Ok(Some(pair)) => pair,
                Ok(None) => return,
                Err(e) => {
                    warn!("accept error: {e}");
                    return;
                }
            };

            let child = match self
                .reactor
                .add(Association::accepted(stream, peer, listener))
            {
                Ok(child) => child,
                Err(e) => {
                    warn!("cannot register connection from {peer}: {e}");
                    continue;
                }
            };

            debug!("accepted {} from {peer}", child.0);
            if let Some(assoc) = self.reactor.assocs.get_mut(&child) {
                assoc.mark_ready();
            }
            self.handler.on_connected(&mut self.reactor, child);
            self.deliver_failures();
        }
    }

    fn finish_connect(&mut self, id: AssocId) {
        let Some(assoc) = self.reactor.assocs.get_mut(&id) else {
            return;
        };

        match assoc.complete_connect() {
            Ok(true) => {
                self.reactor.flush(id);
                self.handler.on_connected(&mut self.reactor, id);
            }
            Ok(false) => {}
            Err(e) => {
                debug!("connect on {} failed: {e}", id.0);
                self.reactor.fail(id);
            }
        }
    }

    fn read(&mut self, id: AssocId) {
        let Some(assoc) = self.reactor.assocs.get_mut(&id) else {
            return;
        };

        let outcome = assoc.fill_inbox();

        loop {
            let Some(assoc) = self.reactor.assocs.get_mut(&id) else {
                return;
            };
            if assoc.is_closed() {
                return;
            }

            match assoc.next_frame() {
                Ok(Some(frame)) => self.handler.on_message(&mut self.reactor, id, frame),
                Ok(None) => break,
                Err(e) => {
                    warn!("unframeable input on {}: {e}", id.0);
                    self.reactor.fail(id);
                    return;
                }
            }
        }

        match outcome {
            Ok(ReadOutcome::Open) => {}
            Ok(ReadOutcome::EndOfStream) => self.reactor.fail(id),
            Err(e) => {
                debug!("read on {} failed: {e}", id.0);
                self.reactor.fail(id);
            }
        }
    }

    fn deliver_failures(&mut self) {
        while let Some(id) = self.reactor.failed.pop_front() {
            self.handler.on_failed(&mut self.reactor, id);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// `tcp:host:port/db` and `host:port` both resolve to `host:port`.
fn resolve(addr: &str) -> Result<SocketAddr, NetError> {
    let bare = addr.strip_prefix("tcp:").unwrap_or(addr);
    let bare = bare.split('/').next().unwrap_or(bare);

    bare.to_socket_addrs()
        .ok()
        .and_then(|mut it| it.next())
        .ok_or_else(|| NetError::Resolve {
            addr: addr.to_owned(),
        })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
