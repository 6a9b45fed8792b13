use std::str;

use bytes::Bytes;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_while, take_while_m_n},
    character::complete::char,
    combinator::{map_res, opt},
    multi::many0,
    sequence::{preceded, terminated, tuple},
};
use tracing::trace;

use super::{crlf, token, wsp1, ParseResult};
use crate::error::{Error, Result};
use crate::types::{Header, Method, SipMessage, StartLine};

fn to_str(bytes: &[u8]) -> std::result::Result<&str, str::Utf8Error> {
    str::from_utf8(bytes)
}

// Request-Line = Method SP Request-URI SP SIP-Version CRLF
fn request_line(input: &[u8]) -> ParseResult<'_, StartLine> {
    map_res(
        tuple((
            token,
            wsp1,
            take_till1(|c| c == b' ' || c == b'\r' || c == b'\n'),
            wsp1,
            tag(b"SIP/2.0"),
            crlf,
        )),
        |(method, _, uri, _, _, _)| -> Result<StartLine> {
            Ok(StartLine::Request {
                method: to_str(method)?.parse::<Method>()?,
                uri: to_str(uri)?.to_string(),
            })
        },
    )(input)
}

// Status-Line = SIP-Version SP Status-Code SP Reason-Phrase CRLF
fn status_line(input: &[u8]) -> ParseResult<'_, StartLine> {
    map_res(
        tuple((
            tag(b"SIP/2.0"),
            wsp1,
            take_while_m_n(3, 3, |c: u8| c.is_ascii_digit()),
            opt(wsp1),
            take_till(|c| c == b'\r' || c == b'\n'),
            crlf,
        )),
        |(_, _, code, _, reason, _)| -> Result<StartLine> {
            let status: u16 = to_str(code)?
                .parse()
                .map_err(|_| Error::ParseError("status code".into()))?;
            if !(100..=699).contains(&status) {
                return Err(Error::InvalidStatusCode(status));
            }
            Ok(StartLine::Response {
                status,
                reason: to_str(reason)?.trim().to_string(),
            })
        },
    )(input)
}

fn line_rest(input: &[u8]) -> ParseResult<'_, &[u8]> {
    terminated(take_till(|c| c == b'\r' || c == b'\n'), crlf)(input)
}

// message-header = field-name HCOLON field-value CRLF, with folding
fn header(input: &[u8]) -> ParseResult<'_, Header> {
    map_res(
        tuple((
            token,
            take_while(|c| c == b' ' || c == b'\t'),
            char(':'),
            line_rest,
            many0(preceded(wsp1, line_rest)),
        )),
        |(name, _, _, first, folded): (&[u8], _, _, &[u8], Vec<&[u8]>)| -> Result<Header> {
            let mut value = to_str(first)?.trim().to_string();
            for part in folded {
                let part = to_str(part)?.trim();
                if !part.is_empty() {
                    value.push(' ');
                    value.push_str(part);
                }
            }
            Ok(Header::new(to_str(name)?, value))
        },
    )(input)
}

fn message_head(input: &[u8]) -> ParseResult<'_, (StartLine, Vec<Header>)> {
    tuple((
        preceded(many0(crlf), alt((status_line, request_line))),
        terminated(many0(header), crlf),
    ))(input)
}

/// True when the datagram holds nothing but line breaks (an RFC 5626
/// keep-alive ping or pong)
pub fn is_keep_alive(data: &[u8]) -> bool {
    !data.is_empty() && data.iter().all(|&b| b == b'\r' || b == b'\n')
}

/// Parse a complete SIP message from a datagram.
///
/// The body is bounded by Content-Length when present; otherwise everything
/// after the blank line is the body.
pub fn parse_message(data: &[u8]) -> Result<SipMessage> {
    let (rest, (start_line, headers)) = message_head(data).map_err(|e| {
        Error::ParseError(match e {
            nom::Err::Incomplete(_) => "incomplete message".to_string(),
            nom::Err::Error(err) | nom::Err::Failure(err) => {
                format!("malformed message near byte {}", data.len() - err.input.len())
            }
        })
    })?;

    let mut message = SipMessage {
        start_line,
        headers,
        body: Bytes::new(),
    };

    let body_len = match message.header("Content-Length") {
        Some(value) => {
            let len: usize = value.trim().parse().map_err(|_| Error::InvalidHeader {
                name: "Content-Length".into(),
                value: value.to_string(),
            })?;
            if len > rest.len() {
                return Err(Error::ParseError(format!(
                    "Content-Length {} exceeds available body of {} bytes",
                    len,
                    rest.len()
                )));
            }
            len
        }
        None => rest.len(),
    };
    message.body = Bytes::copy_from_slice(&rest[..body_len]);

    trace!(start_line = %message, headers = message.headers.len(), body = body_len, "Parsed SIP message");
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTER_OK: &[u8] = b"SIP/2.0 200 OK\r\n\
Via: SIP/2.0/UDP 10.0.0.2:5060;branch=z9hG4bK1\r\n\
From: <sip:+33600000000@ims.example.org>;tag=a\r\n\
To: <sip:+33600000000@ims.example.org>;tag=b\r\n\
Call-ID: reg-1\r\n\
CSeq: 2 REGISTER\r\n\
P-Associated-URI: <sip:+33600000000@ims.example.org>,\r\n <tel:+33600000000>\r\n\
Content-Length: 0\r\n\
\r\n";

    #[test]
    fn test_parse_response_with_folded_header() {
        let msg = parse_message(REGISTER_OK).unwrap();
        assert_eq!(msg.status_code(), Some(200));
        assert_eq!(msg.method(), Some(Method::Register));
        assert_eq!(msg.call_id(), Some("reg-1"));
        assert_eq!(
            msg.header("P-Associated-URI"),
            Some("<sip:+33600000000@ims.example.org>, <tel:+33600000000>")
        );
        assert!(msg.body.is_empty());
    }

    #[test]
    fn test_parse_request_with_body_and_lf_endings() {
        let data = b"MESSAGE sip:bob@example.com SIP/2.0\n\
v: SIP/2.0/UDP h;branch=z9hG4bK2\n\
f: <sip:alice@example.com>;tag=1\n\
t: <sip:bob@example.com>\n\
i: msg-1\n\
CSeq: 7 MESSAGE\n\
l: 5\n\
\n\
hello trailing";
        let msg = parse_message(data).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some(Method::Message));
        assert!(msg.has_mandatory_headers());
        assert_eq!(&msg.body[..], b"hello");
    }

    #[test]
    fn test_leading_crlf_is_skipped() {
        let mut data = b"\r\n".to_vec();
        data.extend_from_slice(REGISTER_OK);
        assert!(parse_message(&data).is_ok());
    }

    #[test]
    fn test_errors() {
        assert!(parse_message(b"garbage\r\n\r\n").is_err());
        assert!(parse_message(b"SIP/2.0 999 Bad\r\n\r\n").is_err());
        assert!(matches!(
            parse_message(b"OPTIONS sip:x SIP/2.0\r\nContent-Length: 10\r\n\r\nshort"),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(
            parse_message(b"OPTIONS sip:x SIP/2.0\r\nContent-Length: ten\r\n\r\n"),
            Err(Error::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_keep_alive_detection() {
        assert!(is_keep_alive(b"\r\n\r\n"));
        assert!(is_keep_alive(b"\r\n"));
        assert!(!is_keep_alive(b""));
        assert!(!is_keep_alive(REGISTER_OK));
    }

    #[test]
    fn test_serialize_then_parse() {
        let msg = parse_message(REGISTER_OK).unwrap();
        let reparsed = parse_message(&msg.to_bytes()).unwrap();
        assert_eq!(reparsed.headers, msg.headers);
    }
}
