use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res},
    sequence::tuple,
    IResult,
};

use crate::error::{Error, Result};

/// The `Byte-Range` header value, `first-last/total`
///
/// `last` and `total` may be `*` when the sender does not know them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub first: u64,
    pub last: Option<u64>,
    pub total: Option<u64>,
}

impl ByteRange {
    pub fn new(first: u64, last: u64, total: u64) -> Self {
        Self {
            first,
            last: Some(last),
            total: Some(total),
        }
    }

    /// Body size announced by the range
    ///
    /// With an open end the chunk runs to the end of the content.
    pub fn chunk_size(&self) -> Option<u64> {
        match (self.last, self.total) {
            (Some(last), _) if last >= self.first => Some((last - self.first).saturating_add(1)),
            (Some(_), _) => None,
            (None, Some(total)) if total >= self.first => Some((total - self.first).saturating_add(1)),
            (None, _) => None,
        }
    }

    /// True when the chunk ends the content
    pub fn is_last(&self) -> bool {
        matches!((self.last, self.total), (Some(last), Some(total)) if last == total)
    }
}

fn number_or_star(input: &str) -> IResult<&str, Option<u64>> {
    alt((
        map(char('*'), |_| None),
        map(map_res(digit1, str::parse::<u64>), Some),
    ))(input)
}

fn byte_range(input: &str) -> IResult<&str, ByteRange> {
    map(
        tuple((
            map_res(digit1, str::parse::<u64>),
            char('-'),
            number_or_star,
            char('/'),
            number_or_star,
        )),
        |(first, _, last, _, total)| ByteRange { first, last, total },
    )(input)
}

impl FromStr for ByteRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        all_consuming(byte_range)(s.trim())
            .map(|(_, range)| range)
            .map_err(|_| Error::parse(format!("invalid byte range '{}'", s)))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.first)?;
        match self.last {
            Some(last) => write!(f, "{}", last)?,
            None => f.write_str("*")?,
        }
        match self.total {
            Some(total) => write!(f, "/{}", total),
            None => f.write_str("/*"),
        }
    }
}
