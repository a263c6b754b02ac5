//! wire_protocol::error.rs
//!
//! Errors raised while framing or decoding gateway traffic.

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- CodecError ------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of frame")]
    UnexpectedEof,

    #[error("declared length {declared} does not match frame size {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("frame of {0} bytes exceeds the frame limit")]
    TooLarge(usize),

    #[error("unknown query kind: {0:#X}")]
    UnknownQueryKind(u8),

    #[error("unknown records kind: {0:#X}")]
    UnknownRecordsKind(u8),

    #[error("invalid presence marker: {0:#X}")]
    InvalidPresence(u8),

    #[error("{0} trailing bytes after body")]
    TrailingBytes(usize),

    #[error("string field is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

// -----------------------------------------------------------------------------
// ----- FrameError ------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the frame limit")]
    TooLarge(usize),

    #[error("declared frame length {0} is below the header size")]
    BadLength(u32),

    #[error("malformed Content-Length header")]
    BadContentLength,
}

// -----------------------------------------------------------------------------
// ----- HttpError -------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request head is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed request line: {0:?}")]
    BadRequestLine(String),

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed header line: {0:?}")]
    BadHeader(String),
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
