// net/mod.rs
//! Event-driven transport: a readiness multiplexer, associations that turn
//! byte streams into frames, and the loop that feeds them to a handler.

pub mod association;
pub mod driver;
pub mod error;
pub mod links;
pub mod multiplexer;
pub mod poller;

pub use association::{AssocState, Association};
pub use driver::{Driver, Reactor};
pub use error::NetError;
pub use links::{AssocId, AssociationHandler, Links};
pub use multiplexer::{Event, Interest, Multiplexer, ObserverId, Progress, Readiness};
pub use poller::{MioPoller, Poller};
