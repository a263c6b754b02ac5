use bytes::Bytes;
use std::error::Error as StdError;

pub trait WireSerializable: Sized {
    type Error: StdError + Send + Sync + 'static;

    /// Look ahead at the buffer to determine if the message is complete,
    /// returning the number of bytes the whole message occupies.
    fn peek(buf: &[u8]) -> Option<usize>;

    /// Serialize the object into bytes for wire transmission.
    fn to_bytes(&self) -> Result<Bytes, Self::Error>;

    /// Deserialize one complete frame into the object.
    fn from_bytes(bytes: &[u8]) -> Result<Self, Self::Error>;
}
