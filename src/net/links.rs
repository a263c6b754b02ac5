//! net/links.rs
//!
//! The seam between the association layer and whatever drives sessions on
//! top of it. `Links` is what a handler may do to associations, and
//! `AssociationHandler` is what the event loop tells a handler.

use std::time::Duration;

use bytes::Bytes;

use super::error::NetError;
use super::multiplexer::ObserverId;

// -----------------------------------------------------------------------------
// ----- AssocId ---------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssocId(pub usize);

impl From<ObserverId> for AssocId {
    fn from(owner: ObserverId) -> Self {
        AssocId(owner.0)
    }
}

impl From<AssocId> for ObserverId {
    fn from(id: AssocId) -> Self {
        ObserverId(id.0)
    }
}

// -----------------------------------------------------------------------------
// ----- Links -----------------------------------------------------------------

pub trait Links {
    /// Start an outbound association; completion arrives as `on_connected`.
    /// Accepts `host:port`, optionally prefixed with `tcp:` and suffixed
    /// with `/database`.
    fn connect(&mut self, addr: &str) -> Result<AssocId, NetError>;

    /// Queue one complete frame. Frames sent while connecting go out once
    /// the connection completes. Unknown or closed ids are ignored.
    fn send(&mut self, id: AssocId, frame: Bytes);

    /// Release the transport. No callbacks follow for this id.
    fn close(&mut self, id: AssocId);

    /// Close and free the association once the current event is done.
    fn destroy(&mut self, id: AssocId);

    /// Close once pending output drains, then report `on_failed`.
    fn close_after_flush(&mut self, id: AssocId);

    fn set_idle_timeout(&mut self, id: AssocId, timeout: Option<Duration>);

    /// The listening association an accepted one came from.
    fn listener_of(&self, id: AssocId) -> Option<AssocId>;
}

// -----------------------------------------------------------------------------
// ----- AssociationHandler ----------------------------------------------------

pub trait AssociationHandler {
    /// An outbound connect completed, or a listener accepted a child.
    fn on_connected(&mut self, links: &mut dyn Links, id: AssocId);

    /// One complete inbound frame.
    fn on_message(&mut self, links: &mut dyn Links, id: AssocId, frame: Bytes);

    /// Transport error, end of stream, or a completed close-after-flush.
    fn on_failed(&mut self, links: &mut dyn Links, id: AssocId);

    /// The idle timeout elapsed without activity.
    fn on_timed_out(&mut self, links: &mut dyn Links, id: AssocId);
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
