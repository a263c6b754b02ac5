//! Client/target session management: pooling, handshake replay, result-set
//! caching, throttling, and the REST front end.

pub mod back;
pub mod diag_map;
pub mod error;
pub mod front;
pub mod optimize;
pub mod pool;
pub mod prewarm;
pub mod record_cache;
pub mod root;
pub mod session;
pub mod sru;
pub mod throttle;
pub mod transform;

pub use error::GatewayError;
pub use session::Gateway;
pub use transform::{CqlPassthrough, QueryTransform, TransformError};
