//! SIP message parsing.
//!
//! The parsers work on raw datagram bytes with `nom`. Line endings may be
//! CRLF or bare LF, and folded header lines (continuation lines starting with
//! whitespace) are joined with a single space.

mod message;

pub use message::{is_keep_alive, parse_message};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::recognize,
    IResult,
};

/// Type alias for parser result
pub type ParseResult<'a, O> = IResult<&'a [u8], O>;

/// RFC 3261 `token` characters
pub fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"-.!%*_+`'~".contains(&c)
}

/// Parses CRLF (accepts \r\n or just \n)
pub fn crlf(input: &[u8]) -> ParseResult<'_, &[u8]> {
    recognize(alt((tag(b"\r\n"), tag(b"\n"))))(input)
}

/// Parses one or more SP / HTAB
pub fn wsp1(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(|c| c == b' ' || c == b'\t')(input)
}

pub fn token(input: &[u8]) -> ParseResult<'_, &[u8]> {
    take_while1(is_token_char)(input)
}
