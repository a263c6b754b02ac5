pub mod codec;
pub mod error;
pub mod frame;
pub mod http;
pub mod pdu;
pub mod wire_serializable;

pub use error::{CodecError, FrameError, HttpError};
pub use frame::{FrameKind, peek_frame};
pub use http::{HttpRequest, HttpResponse, HttpVersion};
pub use pdu::{
    Body, Close, Databases, Header, InitRequest, InitResponse, Pdu, PresentRequest,
    PresentResponse, Query, Record, Records, SearchRequest, SearchResponse,
};
pub use wire_serializable::WireSerializable;
