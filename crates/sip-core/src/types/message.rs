use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::types::method::Method;

/// Headers every SIP message must carry before the transaction layer will
/// accept it (RFC 3261 Section 8.1.1).
pub const MANDATORY_HEADERS: [&str; 5] = ["From", "To", "Call-ID", "CSeq", "Via"];

/// Maps a compact header form (RFC 3261 Section 7.3.3) to its full name
fn expand_compact(name: &str) -> &str {
    match name {
        "i" | "I" => "Call-ID",
        "f" | "F" => "From",
        "t" | "T" => "To",
        "v" | "V" => "Via",
        "m" | "M" => "Contact",
        "l" | "L" => "Content-Length",
        "c" | "C" => "Content-Type",
        "k" | "K" => "Supported",
        "s" | "S" => "Subject",
        "e" | "E" => "Content-Encoding",
        other => other,
    }
}

fn same_header(a: &str, b: &str) -> bool {
    expand_compact(a).eq_ignore_ascii_case(expand_compact(b))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Method, uri: String },
    Response { status: u16, reason: String },
}

/// Parsed CSeq header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidHeader {
            name: "CSeq".into(),
            value: value.to_string(),
        };
        let mut parts = value.split_whitespace();
        let seq = parts
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let method = parts.next().ok_or_else(invalid)?.parse()?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(CSeq { seq, method })
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

/// A SIP request or response.
///
/// Headers keep their wire order; lookups are case-insensitive and accept
/// compact forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start_line: StartLine,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl SipMessage {
    pub fn request(method: Method, uri: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Request {
                method,
                uri: uri.into(),
            },
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn response(status: u16, reason: impl Into<String>) -> Result<Self> {
        if !(100..=699).contains(&status) {
            return Err(Error::InvalidStatusCode(status));
        }
        Ok(Self {
            start_line: StartLine::Response {
                status,
                reason: reason.into(),
            },
            headers: Vec::new(),
            body: Bytes::new(),
        })
    }

    /// Build a response to `request`, copying the headers that identify the
    /// transaction (Via, From, To, Call-ID, CSeq).
    pub fn response_to(request: &SipMessage, status: u16, reason: impl Into<String>) -> Result<Self> {
        let mut response = Self::response(status, reason)?;
        for header in &request.headers {
            if MANDATORY_HEADERS.iter().any(|name| same_header(&header.name, name)) {
                response.headers.push(Header::new(expand_compact(&header.name), header.value.clone()));
            }
        }
        Ok(response)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.set_header("Content-Type", content_type);
        self
    }

    /// Replace every occurrence of `name` with a single header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|h| !same_header(&h.name, name));
        self.headers.push(Header::new(name, value));
    }

    /// First value of the named header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| same_header(&h.name, name))
            .map(|h| h.value.as_str())
    }

    /// All values of the named header in wire order
    pub fn headers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |h| same_header(&h.name, name))
            .map(|h| h.value.as_str())
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    /// Whether this is a final (>= 200) response
    pub fn is_final_response(&self) -> bool {
        self.status_code().map_or(false, |status| status >= 200)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.header("Call-ID")
    }

    pub fn cseq(&self) -> Option<CSeq> {
        self.header("CSeq").and_then(|v| CSeq::parse(v).ok())
    }

    /// Request method, or for responses the method named in CSeq
    pub fn method(&self) -> Option<Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method.clone()),
            StartLine::Response { .. } => self.cseq().map(|c| c.method),
        }
    }

    /// First mandatory header that is missing, if any
    pub fn missing_mandatory_header(&self) -> Option<&'static str> {
        MANDATORY_HEADERS
            .iter()
            .copied()
            .find(|name| self.header(name).is_none())
    }

    pub fn has_mandatory_headers(&self) -> bool {
        self.missing_mandatory_header().is_none()
    }

    /// Serialize for the wire. Content-Length is added when absent.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        match &self.start_line {
            StartLine::Request { method, uri } => {
                buf.put_slice(format!("{} {} SIP/2.0\r\n", method, uri).as_bytes());
            }
            StartLine::Response { status, reason } => {
                buf.put_slice(format!("SIP/2.0 {} {}\r\n", status, reason).as_bytes());
            }
        }
        for header in &self.headers {
            buf.put_slice(header.name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(header.value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        if self.header("Content-Length").is_none() {
            buf.put_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start_line {
            StartLine::Request { method, uri } => write!(f, "{} {}", method, uri),
            StartLine::Response { status, reason } => write!(f, "{} {}", status, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> SipMessage {
        SipMessage::request(Method::Invite, "sip:bob@example.com")
            .with_header("Via", "SIP/2.0/UDP 192.0.2.4;branch=z9hG4bK776")
            .with_header("From", "<sip:alice@example.com>;tag=1928")
            .with_header("To", "<sip:bob@example.com>")
            .with_header("Call-ID", "a84b4c76e66710")
            .with_header("CSeq", "314159 INVITE")
    }

    #[test]
    fn test_header_lookup_is_case_insensitive_and_compact_aware() {
        let msg = invite().with_header("i", "ignored-second");
        assert_eq!(msg.header("call-id"), Some("a84b4c76e66710"));
        assert_eq!(msg.header("I"), Some("a84b4c76e66710"));
        assert_eq!(msg.headers("Call-ID").count(), 2);
    }

    #[test]
    fn test_cseq() {
        let cseq = invite().cseq().unwrap();
        assert_eq!(cseq.seq, 314159);
        assert_eq!(cseq.method, Method::Invite);
        assert!(CSeq::parse("abc INVITE").is_err());
        assert!(CSeq::parse("1").is_err());
    }

    #[test]
    fn test_mandatory_headers() {
        assert!(invite().has_mandatory_headers());
        let incomplete = SipMessage::request(Method::Options, "sip:x@y").with_header("Via", "SIP/2.0/UDP h");
        assert_eq!(incomplete.missing_mandatory_header(), Some("From"));
    }

    #[test]
    fn test_response_to_copies_transaction_headers() {
        let request = invite().with_header("Contact", "<sip:alice@192.0.2.4>");
        let response = SipMessage::response_to(&request, 200, "OK").unwrap();
        assert_eq!(response.status_code(), Some(200));
        assert!(response.is_final_response());
        assert_eq!(response.method(), Some(Method::Invite));
        assert_eq!(response.call_id(), request.call_id());
        assert!(response.header("Contact").is_none());
    }

    #[test]
    fn test_invalid_status() {
        assert_eq!(SipMessage::response(42, "Nope"), Err(Error::InvalidStatusCode(42)));
    }

    #[test]
    fn test_to_bytes_adds_content_length() {
        let bytes = invite().with_body("application/sdp", "v=0\r\n").to_bytes();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("INVITE sip:bob@example.com SIP/2.0\r\n"));
        assert!(text.contains("Content-Type: application/sdp\r\n"));
        assert!(text.contains("Content-Length: 5\r\n\r\nv=0\r\n"));
    }
}
