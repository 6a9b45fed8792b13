//! SIP message types.

pub mod address;
pub mod message;
pub mod method;

pub use message::{CSeq, Header, SipMessage, StartLine};
pub use method::Method;
