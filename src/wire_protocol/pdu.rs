//! Module: wire_protocol::pdu
//!
//! Native search/present protocol units. Every frame is
//! `tag:u8 | len:u32 (includes itself) | header | body`, where the header
//! carries the reference id plus the gateway's out-of-band hints (session
//! cookie, target override). Tags we do not model are carried opaquely so
//! they can still be forwarded.

use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

use super::codec::{Reader, put_blob, put_cstr, put_opt_cstr};
use super::error::CodecError;
use super::frame::MAX_FRAME_LEN;
use super::WireSerializable;

// -----------------------------------------------------------------------------
// ----- Tags ------------------------------------------------------------------

pub const TAG_INIT_REQUEST: u8 = b'I';
pub const TAG_INIT_RESPONSE: u8 = b'i';
pub const TAG_SEARCH_REQUEST: u8 = b'S';
pub const TAG_SEARCH_RESPONSE: u8 = b's';
pub const TAG_PRESENT_REQUEST: u8 = b'P';
pub const TAG_PRESENT_RESPONSE: u8 = b'p';
pub const TAG_CLOSE: u8 = b'X';

const QUERY_RPN: u8 = 1;
const QUERY_CQL: u8 = 2;

const RECORDS_NONE: u8 = 0;
const RECORDS_DATABASE: u8 = 1;
const RECORDS_DIAGNOSTIC: u8 = 2;

// -----------------------------------------------------------------------------
// ----- Pdu -------------------------------------------------------------------

pub type Databases = SmallVec<[String; 2]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub header: Header,
    pub body: Body,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub reference_id: Option<String>,
    pub cookie: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    InitRequest(InitRequest),
    InitResponse(InitResponse),
    SearchRequest(SearchRequest),
    SearchResponse(SearchResponse),
    PresentRequest(PresentRequest),
    PresentResponse(PresentResponse),
    Close(Close),
    Other { tag: u8, payload: Bytes },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitRequest {
    /// Open authentication string, `user/password`.
    pub auth: Option<String>,
    pub implementation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitResponse {
    pub accepted: bool,
    pub implementation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub small_set_upper_bound: i32,
    pub large_set_lower_bound: i32,
    pub medium_set_present_number: i32,
    pub result_set_name: String,
    pub databases: Databases,
    pub small_esn: Option<String>,
    pub medium_esn: Option<String>,
    pub preferred_syntax: Option<String>,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Prefix notation, `@attr 1=4 title`.
    Rpn(String),
    Cql(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub result_count: i64,
    pub returned: i32,
    pub next_position: i32,
    pub status: bool,
    pub records: Records,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentRequest {
    pub result_set_id: String,
    pub start: i32,
    pub count: i32,
    pub esn: Option<String>,
    pub syntax: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentResponse {
    pub returned: i32,
    pub next_position: i32,
    pub status: bool,
    pub records: Records,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    pub reason: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Records {
    None,
    Database(Vec<Record>),
    Diagnostic { code: u32, addinfo: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub database: String,
    pub syntax: Option<String>,
    pub data: Bytes,
}

// -----------------------------------------------------------------------------
// ----- Pdu: Static -----------------------------------------------------------

impl Pdu {
    pub fn new(body: Body) -> Self {
        Self {
            header: Header::default(),
            body,
        }
    }

    pub fn init_request(auth: Option<String>) -> Self {
        Self::new(Body::InitRequest(InitRequest {
            auth,
            implementation_name: None,
        }))
    }

    pub fn init_response(accepted: bool) -> Self {
        Self::new(Body::InitResponse(InitResponse {
            accepted,
            implementation_name: None,
        }))
    }
}

// -----------------------------------------------------------------------------
// ----- Pdu: Builder ----------------------------------------------------------

impl Pdu {
    pub fn with_reference_id(mut self, reference_id: Option<String>) -> Self {
        self.header.reference_id = reference_id;
        self
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.header.cookie = cookie;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.header.proxy = Some(proxy.into());
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Pdu: Public -----------------------------------------------------------

impl Pdu {
    pub fn tag(&self) -> u8 {
        match &self.body {
            Body::InitRequest(_) => TAG_INIT_REQUEST,
            Body::InitResponse(_) => TAG_INIT_RESPONSE,
            Body::SearchRequest(_) => TAG_SEARCH_REQUEST,
            Body::SearchResponse(_) => TAG_SEARCH_RESPONSE,
            Body::PresentRequest(_) => TAG_PRESENT_REQUEST,
            Body::PresentResponse(_) => TAG_PRESENT_RESPONSE,
            Body::Close(_) => TAG_CLOSE,
            Body::Other { tag, .. } => *tag,
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.body {
            Body::InitRequest(_) => "InitRequest",
            Body::InitResponse(_) => "InitResponse",
            Body::SearchRequest(_) => "SearchRequest",
            Body::SearchResponse(_) => "SearchResponse",
            Body::PresentRequest(_) => "PresentRequest",
            Body::PresentResponse(_) => "PresentResponse",
            Body::Close(_) => "Close",
            Body::Other { .. } => "Other",
        }
    }

    pub fn is_init_request(&self) -> bool {
        matches!(self.body, Body::InitRequest(_))
    }

    /// Header hints are gateway-private and never reach a target.
    pub fn strip_hints(mut self) -> Self {
        self.header.cookie = None;
        self.header.proxy = None;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Records ---------------------------------------------------------------

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Database(records) => records.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -----------------------------------------------------------------------------
// ----- WireSerializable ------------------------------------------------------

impl WireSerializable for Pdu {
    type Error = CodecError;

    fn peek(buf: &[u8]) -> Option<usize> {
        if buf.len() < 5 {
            return None;
        }
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if len < 4 || buf.len() < 1 + len {
            return None;
        }
        Some(1 + len)
    }

    fn to_bytes(&self) -> Result<Bytes, Self::Error> {
        let mut buf = BytesMut::with_capacity(64);

        buf.put_u8(self.tag());
        buf.put_u32(0); // length placeholder

        put_opt_cstr(&mut buf, self.header.reference_id.as_deref());
        put_opt_cstr(&mut buf, self.header.cookie.as_deref());
        put_opt_cstr(&mut buf, self.header.proxy.as_deref());

        match &self.body {
            Body::InitRequest(b) => {
                put_opt_cstr(&mut buf, b.auth.as_deref());
                put_opt_cstr(&mut buf, b.implementation_name.as_deref());
            }
            Body::InitResponse(b) => {
                buf.put_u8(b.accepted as u8);
                put_opt_cstr(&mut buf, b.implementation_name.as_deref());
            }
            Body::SearchRequest(b) => {
                buf.put_i32(b.small_set_upper_bound);
                buf.put_i32(b.large_set_lower_bound);
                buf.put_i32(b.medium_set_present_number);
                put_cstr(&mut buf, &b.result_set_name);
                buf.put_u16(b.databases.len() as u16);
                for db in &b.databases {
                    put_cstr(&mut buf, db);
                }
                put_opt_cstr(&mut buf, b.small_esn.as_deref());
                put_opt_cstr(&mut buf, b.medium_esn.as_deref());
                put_opt_cstr(&mut buf, b.preferred_syntax.as_deref());
                match &b.query {
                    Query::Rpn(q) => {
                        buf.put_u8(QUERY_RPN);
                        put_cstr(&mut buf, q);
                    }
                    Query::Cql(q) => {
                        buf.put_u8(QUERY_CQL);
                        put_cstr(&mut buf, q);
                    }
                }
            }
            Body::SearchResponse(b) => {
                buf.put_i64(b.result_count);
                buf.put_i32(b.returned);
                buf.put_i32(b.next_position);
                buf.put_u8(b.status as u8);
                put_records(&mut buf, &b.records);
            }
            Body::PresentRequest(b) => {
                put_cstr(&mut buf, &b.result_set_id);
                buf.put_i32(b.start);
                buf.put_i32(b.count);
                put_opt_cstr(&mut buf, b.esn.as_deref());
                put_opt_cstr(&mut buf, b.syntax.as_deref());
            }
            Body::PresentResponse(b) => {
                buf.put_i32(b.returned);
                buf.put_i32(b.next_position);
                buf.put_u8(b.status as u8);
                put_records(&mut buf, &b.records);
            }
            Body::Close(b) => buf.put_u8(b.reason),
            Body::Other { payload, .. } => buf.extend_from_slice(payload),
        }

        if buf.len() > MAX_FRAME_LEN {
            return Err(CodecError::TooLarge(buf.len()));
        }

        let len = (buf.len() - 1) as u32;
        buf[1..5].copy_from_slice(&len.to_be_bytes());

        Ok(buf.freeze())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 5 {
            return Err(CodecError::UnexpectedEof);
        }

        let tag = bytes[0];
        let declared = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if declared as usize != bytes.len() - 1 {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let mut r = Reader::new(&bytes[5..]);

        let header = Header {
            reference_id: r.opt_cstr()?,
            cookie: r.opt_cstr()?,
            proxy: r.opt_cstr()?,
        };

        let body = match tag {
            TAG_INIT_REQUEST => Body::InitRequest(InitRequest {
                auth: r.opt_cstr()?,
                implementation_name: r.opt_cstr()?,
            }),
            TAG_INIT_RESPONSE => Body::InitResponse(InitResponse {
                accepted: r.bool()?,
                implementation_name: r.opt_cstr()?,
            }),
            TAG_SEARCH_REQUEST => {
                let small_set_upper_bound = r.i32()?;
                let large_set_lower_bound = r.i32()?;
                let medium_set_present_number = r.i32()?;
                let result_set_name = r.cstr()?;

                let n = r.u16()?;
                let mut databases = Databases::new();
                for _ in 0..n {
                    databases.push(r.cstr()?);
                }

                let small_esn = r.opt_cstr()?;
                let medium_esn = r.opt_cstr()?;
                let preferred_syntax = r.opt_cstr()?;
                let query = match r.u8()? {
                    QUERY_RPN => Query::Rpn(r.cstr()?),
                    QUERY_CQL => Query::Cql(r.cstr()?),
                    k => return Err(CodecError::UnknownQueryKind(k)),
                };

                Body::SearchRequest(SearchRequest {
                    small_set_upper_bound,
                    large_set_lower_bound,
                    medium_set_present_number,
                    result_set_name,
                    databases,
                    small_esn,
                    medium_esn,
                    preferred_syntax,
                    query,
                })
            }
            TAG_SEARCH_RESPONSE => Body::SearchResponse(SearchResponse {
                result_count: r.i64()?,
                returned: r.i32()?,
                next_position: r.i32()?,
                status: r.bool()?,
                records: read_records(&mut r)?,
            }),
            TAG_PRESENT_REQUEST => Body::PresentRequest(PresentRequest {
                result_set_id: r.cstr()?,
                start: r.i32()?,
                count: r.i32()?,
                esn: r.opt_cstr()?,
                syntax: r.opt_cstr()?,
            }),
            TAG_PRESENT_RESPONSE => Body::PresentResponse(PresentResponse {
                returned: r.i32()?,
                next_position: r.i32()?,
                status: r.bool()?,
                records: read_records(&mut r)?,
            }),
            TAG_CLOSE => Body::Close(Close { reason: r.u8()? }),
            tag => Body::Other {
                tag,
                payload: Bytes::copy_from_slice(r.rest()),
            },
        };

        r.finish()?;

        Ok(Pdu { header, body })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Records -----------------------------------------------------

fn put_records(buf: &mut BytesMut, records: &Records) {
    match records {
        Records::None => buf.put_u8(RECORDS_NONE),
        Records::Database(list) => {
            buf.put_u8(RECORDS_DATABASE);
            buf.put_u32(list.len() as u32);
            for rec in list {
                put_cstr(buf, &rec.database);
                put_opt_cstr(buf, rec.syntax.as_deref());
                put_blob(buf, &rec.data);
            }
        }
        Records::Diagnostic { code, addinfo } => {
            buf.put_u8(RECORDS_DIAGNOSTIC);
            buf.put_u32(*code);
            put_opt_cstr(buf, addinfo.as_deref());
        }
    }
}

fn read_records(r: &mut Reader<'_>) -> Result<Records, CodecError> {
    match r.u8()? {
        RECORDS_NONE => Ok(Records::None),
        RECORDS_DATABASE => {
            let n = r.u32()?;
            let mut list = Vec::with_capacity(n.min(1024) as usize);
            for _ in 0..n {
                list.push(Record {
                    database: r.cstr()?,
                    syntax: r.opt_cstr()?,
                    data: r.blob()?,
                });
            }
            Ok(Records::Database(list))
        }
        RECORDS_DIAGNOSTIC => Ok(Records::Diagnostic {
            code: r.u32()?,
            addinfo: r.opt_cstr()?,
        }),
        k => Err(CodecError::UnknownRecordsKind(k)),
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
