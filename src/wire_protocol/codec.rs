//! wire_protocol::codec.rs
//!
//! Field-level primitives shared by every PDU body: big-endian integers,
//! NUL-terminated strings, optional strings with a presence byte, and
//! length-prefixed blobs.

use bytes::{BufMut, Bytes, BytesMut};
use memchr::memchr;

use super::error::CodecError;

// -----------------------------------------------------------------------------
// ----- Reader ----------------------------------------------------------------

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        let (&b, rest) = self.buf.split_first().ok_or(CodecError::UnexpectedEof)?;
        self.buf = rest;
        Ok(b)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub(crate) fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    /// Consumes the terminator too.
    pub(crate) fn cstr(&mut self) -> Result<String, CodecError> {
        let nul = memchr(0, self.buf).ok_or(CodecError::UnexpectedEof)?;
        let (text, rest) = self.buf.split_at(nul);
        self.buf = &rest[1..];
        Ok(std::str::from_utf8(text)?.to_owned())
    }

    pub(crate) fn opt_cstr(&mut self) -> Result<Option<String>, CodecError> {
        match self.u8()? {
            0 => Ok(None),
            1 => self.cstr().map(Some),
            other => Err(CodecError::InvalidPresence(other)),
        }
    }

    pub(crate) fn blob(&mut self) -> Result<Bytes, CodecError> {
        let len = self.u32()? as usize;
        if self.buf.len() < len {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(Bytes::copy_from_slice(head))
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    pub(crate) fn finish(self) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(self.buf.len()))
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        if self.buf.len() < N {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, rest) = self.buf.split_at(N);
        self.buf = rest;

        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok(out)
    }
}

// -----------------------------------------------------------------------------
// ----- Writers ---------------------------------------------------------------

#[inline]
pub(crate) fn put_cstr(buf: &mut BytesMut, val: &str) {
    buf.extend_from_slice(val.as_bytes());
    buf.put_u8(0);
}

#[inline]
pub(crate) fn put_opt_cstr(buf: &mut BytesMut, val: Option<&str>) {
    match val {
        Some(v) => {
            buf.put_u8(1);
            put_cstr(buf, v);
        }
        None => buf.put_u8(0),
    }
}

#[inline]
pub(crate) fn put_blob(buf: &mut BytesMut, val: &[u8]) {
    buf.put_u32(val.len() as u32);
    buf.extend_from_slice(val);
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_what_writers_produce() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        put_cstr(&mut buf, "Default");
        put_opt_cstr(&mut buf, None);
        put_opt_cstr(&mut buf, Some("F"));
        put_blob(&mut buf, b"<rec/>");
        buf.put_i64(-1);

        let mut r = Reader::new(&buf);
        assert_eq!(r.u16().unwrap(), 2);
        assert_eq!(r.cstr().unwrap(), "Default");
        assert_eq!(r.opt_cstr().unwrap(), None);
        assert_eq!(r.opt_cstr().unwrap().as_deref(), Some("F"));
        assert_eq!(&r.blob().unwrap()[..], b"<rec/>");
        assert_eq!(r.i64().unwrap(), -1);
        r.finish().unwrap();
    }

    #[test]
    fn short_blob_is_eof() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.extend_from_slice(b"abc");

        let mut r = Reader::new(&buf);
        assert!(matches!(r.blob(), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn bad_presence_marker() {
        let mut r = Reader::new(&[7, b'x', 0]);
        assert!(matches!(r.opt_cstr(), Err(CodecError::InvalidPresence(7))));
    }

    #[test]
    fn leftover_bytes_are_reported() {
        let mut r = Reader::new(&[1, 2, 3]);
        r.u8().unwrap();
        assert!(matches!(r.finish(), Err(CodecError::TrailingBytes(2))));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
