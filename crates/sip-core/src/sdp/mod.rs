//! Session Description Protocol parsing (RFC 4566).
//!
//! SDP fields appear in a fixed order but most are optional, so the parser
//! reads one `x=` token at a time and pushes it back when it is not the
//! field expected next. The pushback queue lives in a [`TokenReader`] created
//! for each call to [`SdpParser::parse`], so concurrent parses share nothing.
//!
//! Optional fields that are absent are simply left empty. A missing mandatory
//! token (`o=`, `s=`, `t=`, or a media `c=` not covered by a session-level
//! connection) is logged and recorded in [`SdpParser::missing_tokens`].

mod media;
mod parser;
mod reader;
mod session;

pub use media::{MediaAttribute, MediaDescription};
pub use parser::SdpParser;
pub use reader::TokenReader;
pub use session::{SessionDescription, TimeDescription};
