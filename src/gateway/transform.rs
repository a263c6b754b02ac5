use thiserror::Error;

use crate::wire_protocol::Query;

// -----------------------------------------------------------------------------
// ----- QueryTransform --------------------------------------------------------

/// Turns the query text of a REST request into a native query.
pub trait QueryTransform: Send {
    fn transform(&self, text: &str) -> Result<Query, TransformError>;
}

/// Targets that speak CQL natively get the text as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct CqlPassthrough;

impl QueryTransform for CqlPassthrough {
    fn transform(&self, text: &str) -> Result<Query, TransformError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TransformError::Empty);
        }
        Ok(Query::Cql(text.to_owned()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("empty query")]
    Empty,

    #[error("cannot translate query: {0}")]
    Unsupported(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
