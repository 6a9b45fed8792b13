//! MSRP chunk framing.
//!
//! ```text
//! MSRP a786hjs2 SEND
//! To-Path: msrp://192.0.2.2:2855/9di4eae923wzd;tcp
//! From-Path: msrp://192.0.2.1:2855/iau39soe2843z;tcp
//! Message-ID: 12339sdqwer
//! Byte-Range: 1-16/16
//! Content-Type: text/plain
//!
//! Hi, I'm Alice!
//! -------a786hjs2$
//! ```
//!
//! A chunk without body (responses, REPORT, empty SEND) goes straight from
//! its headers to the end-line.

use std::fmt::Write as _;
use std::io::{BufRead, Read};
use std::str;

use bytes::{BufMut, Bytes, BytesMut};
use nom::{
    bytes::complete::{tag, take_till1, take_while_m_n},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map_res, opt, rest},
    sequence::{preceded, tuple},
    IResult,
};
use tracing::trace;

use crate::byte_range::ByteRange;
use crate::constants::*;
use crate::error::{Error, Result};

/// The continuation flag closing every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationFlag {
    /// `$`: last chunk of the message
    Last,
    /// `+`: more chunks follow
    More,
    /// `#`: the sender gave up on the message
    Abort,
}

impl ContinuationFlag {
    pub fn as_byte(self) -> u8 {
        match self {
            ContinuationFlag::Last => FLAG_LAST_CHUNK,
            ContinuationFlag::More => FLAG_MORE_CHUNK,
            ContinuationFlag::Abort => FLAG_ABORT_CHUNK,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            FLAG_LAST_CHUNK => Some(ContinuationFlag::Last),
            FLAG_MORE_CHUNK => Some(ContinuationFlag::More),
            FLAG_ABORT_CHUNK => Some(ContinuationFlag::Abort),
            _ => None,
        }
    }
}

/// Chunk headers in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsrpHeaders(Vec<(String, String)>);

impl MsrpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first header called `name`, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn byte_range(&self) -> Option<Result<ByteRange>> {
        self.get(HEADER_BYTE_RANGE).map(str::parse)
    }

    fn encode(&self, buf: &mut BytesMut) {
        for (name, value) in &self.0 {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(NEW_LINE.as_bytes());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrpRequest {
    pub transaction_id: String,
    pub method: String,
    pub headers: MsrpHeaders,
    /// `None` for a chunk without body
    pub data: Option<Bytes>,
    pub flag: ContinuationFlag,
}

impl MsrpRequest {
    /// A SEND carrying `data`, the chunk at `range` of the message
    pub fn send(
        transaction_id: impl Into<String>,
        to: &str,
        from: &str,
        message_id: &str,
        range: ByteRange,
        data: Bytes,
    ) -> Self {
        let flag = if range.is_last() {
            ContinuationFlag::Last
        } else {
            ContinuationFlag::More
        };
        Self {
            transaction_id: transaction_id.into(),
            method: METHOD_SEND.to_string(),
            headers: MsrpHeaders::new()
                .with(HEADER_TO_PATH, to)
                .with(HEADER_FROM_PATH, from)
                .with(HEADER_MESSAGE_ID, message_id)
                .with(HEADER_BYTE_RANGE, range.to_string()),
            data: Some(data),
            flag,
        }
    }

    /// A SEND without body, used to open the connection towards the peer
    pub fn empty_send(transaction_id: impl Into<String>, to: &str, from: &str, message_id: &str) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            method: METHOD_SEND.to_string(),
            headers: MsrpHeaders::new()
                .with(HEADER_TO_PATH, to)
                .with(HEADER_FROM_PATH, from)
                .with(HEADER_MESSAGE_ID, message_id),
            data: None,
            flag: ContinuationFlag::Last,
        }
    }

    /// A positive success REPORT answering a received SEND
    ///
    /// The paths are swapped from the SEND's headers.
    pub fn success_report(
        transaction_id: impl Into<String>,
        send_headers: &MsrpHeaders,
        last_byte: u64,
        total: u64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            method: METHOD_REPORT.to_string(),
            headers: MsrpHeaders::new()
                .with(HEADER_MESSAGE_ID, send_headers.get(HEADER_MESSAGE_ID).unwrap_or_default())
                .with(HEADER_TO_PATH, send_headers.get(HEADER_FROM_PATH).unwrap_or_default())
                .with(HEADER_FROM_PATH, send_headers.get(HEADER_TO_PATH).unwrap_or_default())
                .with(HEADER_BYTE_RANGE, ByteRange::new(1, last_byte, total).to_string())
                .with(HEADER_STATUS, STATUS_OK),
            data: None,
            flag: ContinuationFlag::Last,
        }
    }

    pub fn is_send(&self) -> bool {
        self.method == METHOD_SEND
    }

    pub fn is_report(&self) -> bool {
        self.method == METHOD_REPORT
    }

    pub fn encode(&self) -> Bytes {
        let body_len = self.data.as_ref().map_or(0, |d| d.len() + 4);
        let mut buf = BytesMut::with_capacity(256 + body_len);
        let _ = write!(
            buf,
            "{} {} {}{}",
            MSRP_PROTOCOL, self.transaction_id, self.method, NEW_LINE
        );
        self.headers.encode(&mut buf);
        if let Some(data) = &self.data {
            buf.put_slice(NEW_LINE.as_bytes());
            buf.put_slice(data);
            buf.put_slice(NEW_LINE.as_bytes());
        }
        put_end_line(&mut buf, &self.transaction_id, self.flag);
        buf.freeze()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsrpResponse {
    pub transaction_id: String,
    pub code: u16,
    pub comment: Option<String>,
    pub headers: MsrpHeaders,
}

impl MsrpResponse {
    /// Answer a request; To-Path and From-Path are swapped, Byte-Range echoed
    pub fn for_request(
        transaction_id: impl Into<String>,
        code: u16,
        comment: Option<&str>,
        request_headers: &MsrpHeaders,
    ) -> Self {
        let mut headers = MsrpHeaders::new()
            .with(HEADER_TO_PATH, request_headers.get(HEADER_FROM_PATH).unwrap_or_default())
            .with(HEADER_FROM_PATH, request_headers.get(HEADER_TO_PATH).unwrap_or_default());
        if let Some(range) = request_headers.get(HEADER_BYTE_RANGE) {
            headers.push(HEADER_BYTE_RANGE, range);
        }
        Self {
            transaction_id: transaction_id.into(),
            code,
            comment: comment.map(str::to_string),
            headers,
        }
    }

    pub fn ok(transaction_id: impl Into<String>, request_headers: &MsrpHeaders) -> Self {
        Self::for_request(transaction_id, RESPONSE_OK, Some(COMMENT_OK), request_headers)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        let _ = write!(buf, "{} {} {}", MSRP_PROTOCOL, self.transaction_id, self.code);
        if let Some(comment) = &self.comment {
            let _ = write!(buf, " {}", comment);
        }
        buf.put_slice(NEW_LINE.as_bytes());
        self.headers.encode(&mut buf);
        put_end_line(&mut buf, &self.transaction_id, ContinuationFlag::Last);
        buf.freeze()
    }
}

fn put_end_line(buf: &mut BytesMut, transaction_id: &str, flag: ContinuationFlag) {
    buf.put_slice(END_MSRP_MSG.as_bytes());
    buf.put_slice(transaction_id.as_bytes());
    buf.put_u8(flag.as_byte());
    buf.put_slice(NEW_LINE.as_bytes());
}

/// One chunk read from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsrpChunk {
    Request(MsrpRequest),
    Response(MsrpResponse),
}

impl MsrpChunk {
    pub fn transaction_id(&self) -> &str {
        match self {
            MsrpChunk::Request(request) => &request.transaction_id,
            MsrpChunk::Response(response) => &response.transaction_id,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            MsrpChunk::Request(request) => request.encode(),
            MsrpChunk::Response(response) => response.encode(),
        }
    }
}

enum StartLine {
    Request { transaction_id: String, method: String },
    Response { transaction_id: String, code: u16, comment: Option<String> },
}

fn is_line_end(c: char) -> bool {
    c == ' ' || c == '\r' || c == '\n'
}

fn status(input: &str) -> IResult<&str, (u16, Option<&str>)> {
    tuple((
        map_res(take_while_m_n(3, 3, |c: char| c.is_ascii_digit()), str::parse::<u16>),
        opt(preceded(space1, rest)),
    ))(input)
}

// req-start = "MSRP" SP transact-id SP method
// resp-line = "MSRP" SP transact-id SP status-code [SP comment]
fn start_line(input: &str) -> IResult<&str, StartLine> {
    let (input, (_, _, transaction_id, _)) =
        tuple((tag(MSRP_PROTOCOL), space1, take_till1(is_line_end), space1))(input)?;

    if let Ok((remaining, (code, comment))) = all_consuming(status)(input) {
        return Ok((
            remaining,
            StartLine::Response {
                transaction_id: transaction_id.to_string(),
                code,
                comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            },
        ));
    }

    let (remaining, method) = all_consuming(take_till1(is_line_end))(input)?;
    Ok((
        remaining,
        StartLine::Request {
            transaction_id: transaction_id.to_string(),
            method: method.to_string(),
        },
    ))
}

fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (value, (name, _, _, _)) = tuple((
        take_till1(|c: char| c == ':' || c == ' '),
        space0,
        char(':'),
        space0,
    ))(input)?;
    Ok(("", (name, value.trim())))
}

/// Reads chunks off a byte stream
///
/// Bodies above the size limit and overlong lines are parse errors, so a
/// peer cannot make the decoder allocate without bound.
pub struct ChunkDecoder<R> {
    reader: R,
    max_chunk_size: usize,
}

impl<R: BufRead> ChunkDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_chunk_size(reader, MAX_RECEIVED_CHUNK_SIZE)
    }

    pub fn with_max_chunk_size(reader: R, max_chunk_size: usize) -> Self {
        Self { reader, max_chunk_size }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next chunk; `None` at end of stream between chunks
    pub fn read_chunk(&mut self) -> Result<Option<MsrpChunk>> {
        let first = loop {
            match self.read_line()? {
                None => return Ok(None),
                // Tolerate stray CRLF between chunks
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        let (_, start) = start_line(&first)
            .map_err(|_| Error::parse(format!("invalid start line '{}'", first)))?;
        let transaction_id = match &start {
            StartLine::Request { transaction_id, .. } | StartLine::Response { transaction_id, .. } => {
                transaction_id.clone()
            }
        };
        let end_line = format!("{}{}", END_MSRP_MSG, transaction_id);

        let mut headers = MsrpHeaders::new();
        let (data, flag) = loop {
            let line = self.read_line()?.ok_or_else(|| Error::parse("stream ended in headers"))?;
            if let Some(flag) = line.strip_prefix(end_line.as_str()) {
                break (None, parse_flag(flag)?);
            }
            if line.is_empty() {
                let size = headers
                    .byte_range()
                    .transpose()?
                    .and_then(|range| range.chunk_size());
                let (data, flag) = self.read_body(size, &end_line)?;
                break (Some(data), flag);
            }
            let (_, (name, value)) = header_line(&line)
                .map_err(|_| Error::parse(format!("invalid header line '{}'", line)))?;
            headers.push(name, value);
        };

        trace!("Read MSRP chunk {} with {} headers", transaction_id, headers.len());

        Ok(Some(match start {
            StartLine::Request { method, .. } => MsrpChunk::Request(MsrpRequest {
                transaction_id,
                method,
                headers,
                data,
                flag,
            }),
            StartLine::Response { code, comment, .. } => MsrpChunk::Response(MsrpResponse {
                transaction_id,
                code,
                comment,
                headers,
            }),
        }))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let read = (&mut self.reader).take(MAX_LINE_SIZE as u64).read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') && read == MAX_LINE_SIZE {
            return Err(Error::parse(format!("line longer than {} bytes", MAX_LINE_SIZE)));
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| Error::parse("non UTF-8 chunk header"))
    }

    fn read_body(&mut self, size: Option<u64>, end_line: &str) -> Result<(Bytes, ContinuationFlag)> {
        match size {
            Some(size) => {
                if size > self.max_chunk_size as u64 {
                    return Err(Error::parse(format!(
                        "chunk of {} bytes exceeds the {} bytes limit",
                        size, self.max_chunk_size
                    )));
                }
                let mut data = vec![0u8; size as usize];
                self.reader.read_exact(&mut data)?;
                let line = self.read_line()?.ok_or_else(|| Error::parse("stream ended in body"))?;
                // Body is followed by CRLF, so the end-line is the next line
                let line = if line.is_empty() {
                    self.read_line()?.ok_or_else(|| Error::parse("stream ended in body"))?
                } else {
                    line
                };
                let flag = line
                    .strip_prefix(end_line)
                    .ok_or_else(|| Error::parse(format!("expected end-line, got '{}'", line)))?;
                Ok((Bytes::from(data), parse_flag(flag)?))
            }
            None => self.scan_body(end_line),
        }
    }

    // Body of unknown size: everything up to CRLF + end-line
    fn scan_body(&mut self, end_line: &str) -> Result<(Bytes, ContinuationFlag)> {
        let mut boundary = Vec::with_capacity(end_line.len() + 2);
        boundary.extend_from_slice(NEW_LINE.as_bytes());
        boundary.extend_from_slice(end_line.as_bytes());

        let mut data = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            self.reader.read_exact(&mut byte)?;
            data.push(byte[0]);
            if data.ends_with(&boundary) {
                data.truncate(data.len() - boundary.len());
                break;
            }
            if data.len() > self.max_chunk_size + boundary.len() {
                return Err(Error::parse(format!(
                    "chunk without end-line within {} bytes",
                    self.max_chunk_size
                )));
            }
        }
        let rest = self.read_line()?.ok_or_else(|| Error::parse("stream ended in end-line"))?;
        Ok((Bytes::from(data), parse_flag(&rest)?))
    }
}

fn parse_flag(flag: &str) -> Result<ContinuationFlag> {
    match flag.as_bytes() {
        [byte] => ContinuationFlag::from_byte(*byte)
            .ok_or_else(|| Error::parse(format!("invalid continuation flag '{}'", flag))),
        _ => Err(Error::parse(format!("invalid continuation flag '{}'", flag))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TO: &str = "msrp://192.0.2.2:2855/9di4eae923wzd;tcp";
    const FROM: &str = "msrp://192.0.2.1:2855/iau39soe2843z;tcp";

    fn decode_all(data: &[u8]) -> Vec<MsrpChunk> {
        let mut decoder = ChunkDecoder::new(Cursor::new(data.to_vec()));
        let mut chunks = Vec::new();
        while let Some(chunk) = decoder.read_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_encode_send() {
        let mut request = MsrpRequest::send(
            "a786hjs2",
            TO,
            FROM,
            "12339sdqwer",
            ByteRange::new(1, 16, 16),
            Bytes::from_static(b"Hi, I'm Alice!!!"),
        );
        request.headers.push(HEADER_CONTENT_TYPE, "text/plain");

        let expected = format!(
            "MSRP a786hjs2 SEND\r\nTo-Path: {}\r\nFrom-Path: {}\r\nMessage-ID: 12339sdqwer\r\n\
             Byte-Range: 1-16/16\r\nContent-Type: text/plain\r\n\r\nHi, I'm Alice!!!\r\n-------a786hjs2$\r\n",
            TO, FROM
        );
        assert_eq!(request.encode(), Bytes::from(expected));
    }

    #[test]
    fn test_intermediate_chunk_flag() {
        let request = MsrpRequest::send("t", TO, FROM, "m", ByteRange::new(1, 4, 8), Bytes::from_static(b"abcd"));
        assert_eq!(request.flag, ContinuationFlag::More);
        assert!(request.encode().ends_with(b"-------t+\r\n"));
    }

    #[test]
    fn test_decode_send_and_response() {
        let request = MsrpRequest::send("tx1", TO, FROM, "m1", ByteRange::new(1, 5, 5), Bytes::from_static(b"he\r\nl"));
        let response = MsrpResponse::ok("tx1", &request.headers);

        let mut wire = request.encode().to_vec();
        wire.extend_from_slice(&response.encode());

        let chunks = decode_all(&wire);
        assert_eq!(chunks, vec![MsrpChunk::Request(request), MsrpChunk::Response(response.clone())]);

        // The response swaps the paths
        assert_eq!(response.headers.get(HEADER_TO_PATH), Some(FROM));
        assert_eq!(response.headers.get("byte-range"), Some("1-5/5"));
    }

    #[test]
    fn test_decode_empty_send() {
        let request = MsrpRequest::empty_send("e1", TO, FROM, "m");
        let chunks = decode_all(&request.encode());
        match &chunks[0] {
            MsrpChunk::Request(decoded) => {
                assert!(decoded.is_send());
                assert_eq!(decoded.data, None);
                assert_eq!(decoded.flag, ContinuationFlag::Last);
            }
            other => panic!("unexpected chunk {:?}", other),
        }
    }

    #[test]
    fn test_decode_body_of_unknown_size() {
        let wire = format!(
            "MSRP u1 SEND\r\nTo-Path: {}\r\nFrom-Path: {}\r\nMessage-ID: m\r\nByte-Range: 1-*/*\r\n\r\nstreamed text\r\n-------u1#\r\n",
            TO, FROM
        );
        match &decode_all(wire.as_bytes())[0] {
            MsrpChunk::Request(request) => {
                assert_eq!(request.data.as_deref(), Some(&b"streamed text"[..]));
                assert_eq!(request.flag, ContinuationFlag::Abort);
            }
            other => panic!("unexpected chunk {:?}", other),
        }
    }

    #[test]
    fn test_decode_report() {
        let send = MsrpRequest::send("s", TO, FROM, "msg-1", ByteRange::new(1, 3, 3), Bytes::from_static(b"abc"));
        let report = MsrpRequest::success_report("r", &send.headers, 3, 3);
        match &decode_all(&report.encode())[0] {
            MsrpChunk::Request(decoded) => {
                assert!(decoded.is_report());
                assert_eq!(decoded.headers.get(HEADER_MESSAGE_ID), Some("msg-1"));
                assert_eq!(decoded.headers.get(HEADER_STATUS), Some(STATUS_OK));
                assert_eq!(decoded.headers.get(HEADER_TO_PATH), Some(FROM));
            }
            other => panic!("unexpected chunk {:?}", other),
        }
    }

    #[test]
    fn test_response_without_comment() {
        let wire = b"MSRP x 413\r\nTo-Path: a\r\nFrom-Path: b\r\n-------x$\r\n";
        match &decode_all(wire)[0] {
            MsrpChunk::Response(response) => {
                assert_eq!(response.code, RESPONSE_STOP_SENDING);
                assert_eq!(response.comment, None);
            }
            other => panic!("unexpected chunk {:?}", other),
        }
    }

    #[test]
    fn test_invalid_chunks() {
        let mut decoder = ChunkDecoder::new(Cursor::new(b"SIP/2.0 200 OK\r\n".to_vec()));
        assert!(matches!(decoder.read_chunk(), Err(Error::Parse(_))));

        let mut decoder = ChunkDecoder::new(Cursor::new(b"MSRP t SEND\r\nTo-Path: a\r\n-------t!\r\n".to_vec()));
        assert!(matches!(decoder.read_chunk(), Err(Error::Parse(_))));

        let mut decoder = ChunkDecoder::new(Cursor::new(b"MSRP t SEND\r\nTo-Path: a\r\n".to_vec()));
        assert!(decoder.read_chunk().is_err());

        let truncated = b"MSRP t SEND\r\nByte-Range: 1-10/10\r\n\r\nabc".to_vec();
        let mut decoder = ChunkDecoder::new(Cursor::new(truncated));
        assert!(matches!(decoder.read_chunk(), Err(Error::Io(_))));
    }

    #[test]
    fn test_oversized_byte_range_rejected() {
        let data = b"MSRP t1 SEND\r\nTo-Path: a\r\nFrom-Path: b\r\nMessage-ID: m\r\n\
Byte-Range: 1-18446744073709551615/*\r\n\r\nhi\r\n-------t1$\r\n";
        let mut decoder = ChunkDecoder::new(Cursor::new(data.to_vec()));
        assert!(matches!(decoder.read_chunk(), Err(Error::Parse(_))));

        let data = b"MSRP t2 SEND\r\nByte-Range: 1-100/100\r\n\r\n";
        let mut decoder = ChunkDecoder::with_max_chunk_size(Cursor::new(data.to_vec()), 10);
        assert!(matches!(decoder.read_chunk(), Err(Error::Parse(_))));
    }

    #[test]
    fn test_unterminated_body_bounded() {
        let mut data = b"MSRP t3 SEND\r\nByte-Range: 1-*/*\r\n\r\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(64));
        let mut decoder = ChunkDecoder::with_max_chunk_size(Cursor::new(data), 16);
        assert!(matches!(decoder.read_chunk(), Err(Error::Parse(_))));
    }

    #[test]
    fn test_overlong_header_line_rejected() {
        let mut data = b"MSRP t4 SEND\r\nTo-Path: ".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_LINE_SIZE + 10));
        data.extend_from_slice(b"\r\n");
        let mut decoder = ChunkDecoder::new(Cursor::new(data));
        assert!(matches!(decoder.read_chunk(), Err(Error::Parse(_))));
    }
}
