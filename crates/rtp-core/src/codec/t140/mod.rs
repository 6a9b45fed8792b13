//! T.140 real-time text over RTP (RFC 4103) with RFC 2198 redundancy.
//!
//! With redundancy each packet repeats the text of the previous
//! `generations` packets so the receiver can fill gaps without
//! retransmission. A RED payload looks like:
//!
//! ```text
//! |1| T140 PT | timestamp offset (14) | length (10) |   one per generation,
//! |1| T140 PT | timestamp offset (14) | length (10) |   oldest first
//! |0| T140 PT |                                         primary header
//! | redundant text, oldest first ... | primary text |
//! ```

mod decoder;
mod encoder;
mod packetizer;

pub use decoder::T140Decoder;
pub use encoder::{T140Encoder, TextBuffer};
pub use packetizer::T140Packetizer;

use std::time::Duration;

/// Size of a redundant block header
pub const REDUNDANT_HEADER_SIZE: usize = 4;

/// Size of the primary block header
pub const PRIMARY_HEADER_SIZE: usize = 1;

/// Default number of redundant generations
pub const DEFAULT_REDUNDANCY_GENERATIONS: usize = 2;

/// U+FFFD in UTF-8, shown in place of text that was lost
pub const LOSS_CHAR: &[u8] = &[0xef, 0xbf, 0xbd];

/// How long a gap may stay open before its text is declared lost
pub const WAIT_FOR_MISSING_PACKET: Duration = Duration::from_millis(500);

/// The same with redundancy, which can fill gaps several packets later
pub const WAIT_FOR_MISSING_PACKET_RED: Duration = Duration::from_millis(3000);

// F bit of a redundant block header
const RED_F_BIT: u8 = 0x80;
