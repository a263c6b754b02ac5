//! Frame boundary detection for inbound byte streams.
//!
//! One listener serves both native clients and HTTP clients, so the first
//! bytes of every frame decide how its boundary is found: a known HTTP method
//! means a CRLFCRLF-terminated head plus an optional `Content-Length` body,
//! anything else is a native `tag | u32 len` frame.

use memchr::memmem;

use super::error::FrameError;
use super::pdu::Pdu;
use super::wire_serializable::WireSerializable;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const MAX_HTTP_HEAD: usize = 64 * 1024;

const HTTP_METHODS: [&[u8]; 6] = [
    b"GET ",
    b"POST ",
    b"HEAD ",
    b"PUT ",
    b"DELETE ",
    b"OPTIONS ",
];

// -----------------------------------------------------------------------------
// ----- FrameKind -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Native,
    Http,
}

// -----------------------------------------------------------------------------
// ----- peek_frame ------------------------------------------------------------

/// Returns the kind and total length of the first complete frame in `buf`,
/// `None` while more bytes are needed.
pub fn peek_frame(buf: &[u8]) -> Result<Option<(FrameKind, usize)>, FrameError> {
    match looks_like_http(buf) {
        None => Ok(None),
        Some(true) => Ok(peek_http(buf)?.map(|n| (FrameKind::Http, n))),
        Some(false) => Ok(peek_native(buf)?.map(|n| (FrameKind::Native, n))),
    }
}

/// Classify an already complete frame.
pub fn kind_of(frame: &[u8]) -> FrameKind {
    match looks_like_http(frame) {
        Some(true) => FrameKind::Http,
        _ => FrameKind::Native,
    }
}

// -----------------------------------------------------------------------------
// ----- Internal --------------------------------------------------------------

fn looks_like_http(buf: &[u8]) -> Option<bool> {
    if buf.is_empty() {
        return None;
    }

    // Native present frames start with 'P' followed by a small length,
    // so a NUL in the second byte settles it early.
    if buf.len() >= 2 && buf[1] == 0 {
        return Some(false);
    }

    let mut undecided = false;
    for method in HTTP_METHODS {
        if buf.len() >= method.len() {
            if buf.starts_with(method) {
                return Some(true);
            }
        } else if method.starts_with(buf) {
            undecided = true;
        }
    }

    if undecided { None } else { Some(false) }
}

fn peek_native(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    if buf.len() < 5 {
        return Ok(None);
    }

    let declared = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if declared < 4 {
        return Err(FrameError::BadLength(declared));
    }

    let total = 1 + declared as usize;
    if total > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(total));
    }

    Ok(Pdu::peek(buf))
}

fn peek_http(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    let Some(head_end) = memmem::find(buf, b"\r\n\r\n") else {
        if buf.len() > MAX_HTTP_HEAD {
            return Err(FrameError::TooLarge(buf.len()));
        }
        return Ok(None);
    };

    let content_length = content_length(&buf[..head_end])?;
    let total = head_end + 4 + content_length;
    if total > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(total));
    }

    Ok((buf.len() >= total).then_some(total))
}

fn content_length(head: &[u8]) -> Result<usize, FrameError> {
    for line in head.split(|&b| b == b'\n').skip(1) {
        let Some(colon) = memchr::memchr(b':', line) else {
            continue;
        };
        let (name, value) = line.split_at(colon);
        if !name.eq_ignore_ascii_case(b"content-length") {
            continue;
        }

        let value = std::str::from_utf8(&value[1..]).map_err(|_| FrameError::BadContentLength)?;
        return value
            .trim()
            .parse::<usize>()
            .map_err(|_| FrameError::BadContentLength);
    }
    Ok(0)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_frame_needs_all_its_bytes() {
        let frame = [b'X', 0, 0, 0, 5, 0];

        assert_eq!(peek_frame(&frame[..3]).unwrap(), None);
        assert_eq!(peek_frame(&frame[..5]).unwrap(), None);
        assert_eq!(
            peek_frame(&frame).unwrap(),
            Some((FrameKind::Native, 6))
        );
    }

    #[test]
    fn encoded_pdus_split_at_their_boundary() {
        let first = Pdu::init_request(None).to_bytes().unwrap();
        let mut stream = first.to_vec();
        stream.extend_from_slice(&Pdu::init_response(true).to_bytes().unwrap());

        assert_eq!(
            peek_frame(&stream).unwrap(),
            Some((FrameKind::Native, first.len()))
        );
        assert_eq!(peek_frame(&first[..first.len() - 1]).unwrap(), None);
    }

    #[test]
    fn native_present_is_not_mistaken_for_post() {
        let frame = [b'P', 0, 0, 0, 4];
        assert_eq!(
            peek_frame(&frame).unwrap(),
            Some((FrameKind::Native, 5))
        );
    }

    #[test]
    fn partial_method_waits() {
        assert_eq!(peek_frame(b"PO").unwrap(), None);
        assert_eq!(peek_frame(b"GE").unwrap(), None);
    }

    #[test]
    fn http_get_without_body() {
        let req = b"GET /Default?operation=explain HTTP/1.1\r\nHost: x\r\n\r\nextra";
        let want = req.len() - "extra".len();

        assert_eq!(peek_frame(req).unwrap(), Some((FrameKind::Http, want)));
    }

    #[test]
    fn http_post_waits_for_body() {
        let head = b"POST /Default HTTP/1.0\r\nContent-Length: 9\r\n\r\n";
        let mut full = head.to_vec();
        full.extend_from_slice(b"query=dog");

        assert_eq!(peek_frame(head).unwrap(), None);
        assert_eq!(
            peek_frame(&full).unwrap(),
            Some((FrameKind::Http, full.len()))
        );
    }

    #[test]
    fn bad_content_length_is_an_error() {
        let req = b"POST / HTTP/1.1\r\ncontent-length: many\r\n\r\n";
        assert!(matches!(
            peek_frame(req),
            Err(FrameError::BadContentLength)
        ));
    }

    #[test]
    fn undersized_native_length_is_an_error() {
        let frame = [b'S', 0, 0, 0, 2];
        assert!(matches!(peek_frame(&frame), Err(FrameError::BadLength(2))));
    }

    #[test]
    fn oversized_native_length_is_an_error() {
        let frame = [b'S', 0x7F, 0xFF, 0xFF, 0xFF];
        assert!(matches!(peek_frame(&frame), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn kind_of_complete_frames() {
        assert_eq!(kind_of(b"GET / HTTP/1.1\r\n\r\n"), FrameKind::Http);
        assert_eq!(kind_of(&[b'I', 0, 0, 0, 4]), FrameKind::Native);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
