use std::io;

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- NetError --------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NetError {
    #[error("cannot resolve target address {addr:?}")]
    Resolve { addr: String },

    #[error("readiness poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
