//! SIP and SDP primitives for the RCS protocol core.
//!
//! - [`types`]: a compact SIP message model ([`SipMessage`], [`Method`],
//!   [`CSeq`]) plus helpers for name-addr / SIP-URI / tel-URI values
//! - [`parser`]: `nom` parsers turning a datagram into a [`SipMessage`]
//! - [`sdp`]: the line-oriented SDP parser producing session and media
//!   description trees
//! - [`registration`]: IMS registration procedures, including GIBA identity
//!   derivation from the SIM
//!
//! # Example
//!
//! ```
//! use rcs_sip_core::sdp::SdpParser;
//!
//! let sdp = "v=0\r\nt=0 0\r\nm=audio 49170 RTP/AVP 0\r\nc=IN IP4 192.0.2.1\r\na=rtpmap:0 PCMU/8000\r\n";
//! let parser = SdpParser::parse(sdp.as_bytes()).unwrap();
//!
//! let media = parser.media_description("audio").unwrap();
//! assert_eq!(media.port, 49170);
//! assert_eq!(media.media_attribute("rtpmap").unwrap().value, "0 PCMU/8000");
//! ```

pub mod error;
pub mod parser;
pub mod registration;
pub mod sdp;
pub mod types;

pub use error::{Error, Result};
pub use parser::parse_message;
pub use types::address;
pub use types::{CSeq, Header, Method, SipMessage, StartLine};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::registration::{GibaRegistrationProcedure, RegistrationProcedure, UserProfile};
    pub use crate::sdp::{MediaAttribute, MediaDescription, SdpParser, SessionDescription};
    pub use crate::{parse_message, CSeq, Error, Header, Method, Result, SipMessage, StartLine};
}
