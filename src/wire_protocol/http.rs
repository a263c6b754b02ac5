//! Module: wire_protocol::http
//!
//! Just enough HTTP/1.x to carry REST-style search and explain requests:
//! request parsing from one complete frame, parameter decoding, and a
//! response builder that negotiates keep-alive per request.

use bytes::{BufMut, Bytes, BytesMut};
use memchr::memmem;

use super::error::HttpError;

// -----------------------------------------------------------------------------
// ----- HttpVersion -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- HttpRequest -----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub version: HttpVersion,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

// -----------------------------------------------------------------------------
// ----- HttpRequest: Static ---------------------------------------------------

impl HttpRequest {
    pub fn parse(frame: &[u8]) -> Result<Self, HttpError> {
        let head_end = memmem::find(frame, b"\r\n\r\n").unwrap_or(frame.len());
        let head = std::str::from_utf8(&frame[..head_end]).map_err(|_| HttpError::InvalidUtf8)?;
        let body = frame.get(head_end + 4..).unwrap_or_default();

        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HttpError::BadRequestLine(request_line.to_owned()));
        };

        let version = match version {
            "HTTP/1.0" => HttpVersion::Http10,
            "HTTP/1.1" => HttpVersion::Http11,
            other => return Err(HttpError::UnsupportedVersion(other.to_owned())),
        };

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
            None => (target.to_owned(), None),
        };

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::BadHeader(line.to_owned()))?;
            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }

        Ok(Self {
            method: method.to_owned(),
            path,
            query,
            version,
            headers,
            body: Bytes::copy_from_slice(body),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- HttpRequest: Public ---------------------------------------------------

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// HTTP/1.1 stays open unless told otherwise, HTTP/1.0 only on request.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("Connection");
        match self.version {
            HttpVersion::Http11 => !connection.is_some_and(|c| c.eq_ignore_ascii_case("close")),
            HttpVersion::Http10 => connection.is_some_and(|c| c.eq_ignore_ascii_case("keep-alive")),
        }
    }

    /// Query string for GET, form body for POST.
    pub fn params(&self) -> Vec<(String, String)> {
        if self.method.eq_ignore_ascii_case("POST") {
            parse_params(&String::from_utf8_lossy(&self.body))
        } else {
            parse_params(self.query.as_deref().unwrap_or_default())
        }
    }

    /// Path without leading slashes, the database the request addresses.
    pub fn database(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

// -----------------------------------------------------------------------------
// ----- HttpResponse ----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(self, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut out = self.with_header("Content-Type", content_type);
        out.body = body.into();
        out
    }

    pub fn to_bytes(&self, version: HttpVersion, keep_alive: bool) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.body.len());

        buf.extend_from_slice(version.as_str().as_bytes());
        buf.extend_from_slice(format!(" {} {}\r\n", self.status, reason(self.status)).as_bytes());

        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }

        let connection = if keep_alive { "Keep-Alive" } else { "close" };
        buf.extend_from_slice(format!("Connection: {connection}\r\n").as_bytes());
        buf.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        buf.put_slice(b"\r\n");
        buf.extend_from_slice(&self.body);

        buf.freeze()
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// Decode `a=1&b=two+words` pairs. Undecodable values are kept verbatim.
pub fn parse_params(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| spaced.clone())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_query() {
        let req = HttpRequest::parse(
            b"GET /Default?operation=searchRetrieve&query=dc.title%3Dwater HTTP/1.1\r\nHost: gw\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.method, "GET");
        assert_eq!(req.database(), "Default");
        assert_eq!(req.version, HttpVersion::Http11);
        assert_eq!(req.header("host"), Some("gw"));

        let params = req.params();
        assert_eq!(params[0], ("operation".into(), "searchRetrieve".into()));
        assert_eq!(params[1], ("query".into(), "dc.title=water".into()));
    }

    #[test]
    fn parses_post_form_body() {
        let req = HttpRequest::parse(
            b"POST /db HTTP/1.0\r\nContent-Length: 20\r\n\r\nquery=salt+water&x=1",
        )
        .unwrap();

        let params = req.params();
        assert_eq!(params[0], ("query".into(), "salt water".into()));
        assert_eq!(params[1], ("x".into(), "1".into()));
    }

    #[test]
    fn keep_alive_follows_version_and_header() {
        let v11 = HttpRequest::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let v11_close = HttpRequest::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        let v10 = HttpRequest::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        let v10_keep =
            HttpRequest::parse(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").unwrap();

        assert!(v11.keep_alive());
        assert!(!v11_close.keep_alive());
        assert!(!v10.keep_alive());
        assert!(v10_keep.keep_alive());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            HttpRequest::parse(b"GET\r\n\r\n"),
            Err(HttpError::BadRequestLine(_))
        ));
        assert!(matches!(
            HttpRequest::parse(b"GET / HTTP/2\r\n\r\n"),
            Err(HttpError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            HttpRequest::parse(b"GET / HTTP/1.1\r\nno-colon\r\n\r\n"),
            Err(HttpError::BadHeader(_))
        ));
    }

    #[test]
    fn response_echoes_version_and_connection() {
        let res = HttpResponse::new(404).to_bytes(HttpVersion::Http10, false);
        let text = String::from_utf8(res.to_vec()).unwrap();

        assert!(text.starts_with("HTTP/1.0 404 Not Found\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn response_body_and_type() {
        let res = HttpResponse::new(200)
            .with_body("text/xml", "<x/>")
            .to_bytes(HttpVersion::Http11, true);
        let text = String::from_utf8(res.to_vec()).unwrap();

        assert!(text.contains("Content-Type: text/xml\r\n"));
        assert!(text.contains("Connection: Keep-Alive\r\n"));
        assert!(text.ends_with("\r\n\r\n<x/>"));
    }

    #[test]
    fn undecodable_params_are_kept() {
        let params = parse_params("q=%ZZ&&flag");
        assert_eq!(params[0], ("q".into(), "%ZZ".into()));
        assert_eq!(params[1], ("flag".into(), "".into()));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
