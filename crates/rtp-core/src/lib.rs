//! RTP/RTCP for the RCS protocol core.
//!
//! This crate carries the media plane of content sharing and real-time text:
//!
//! - [`packet`]: the shared [`Packet`]/[`Buffer`] primitives, the RFC 3550 RTP
//!   packet and the RTCP packet family (SR, RR, SDES, BYE, APP, compound)
//! - [`codec`]: the [`Codec`] chain element, RFC 4629 H.263 framing and
//!   T.140 real-time text with RFC 2198 redundancy
//! - [`transport`]: UDP transmitters and receivers for RTP and RTCP
//! - [`media`]: player/renderer contracts and the pipelines that drive a codec
//!   chain between them and the transport
//! - [`source`]: the per-session SSRC/CNAME identity
//!
//! Every RTP session owns its own [`RtpSource`]; nothing in this crate keeps
//! process-wide state.

pub mod codec;
pub mod error;
pub mod event;
pub mod format;
pub mod media;
pub mod packet;
pub mod source;
pub mod stats;
pub mod transport;

/// RTP synchronization source identifier
pub type RtpSsrc = u32;

/// RTP timestamp in media clock units
pub type RtpTimestamp = u32;

/// RTP sequence number
pub type RtpSequenceNumber = u16;

/// Protocol version carried in every RTP and RTCP header
pub const RTP_VERSION: u8 = 2;

/// Payload type used by peers for NAT keep-alive datagrams
pub const KEEP_ALIVE_PAYLOAD_TYPE: u8 = 12;

pub use codec::{Codec, ProcessResult};
pub use error::{Error, Result};
pub use event::{RtcpEvent, RtcpEventListener};
pub use format::{Format, MediaKind};
pub use packet::rtcp::{RtcpPacket, RtcpPacketType};
pub use packet::{Buffer, Packet, RtpPacket};
pub use source::RtpSource;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::codec::h263::{H263Depacketizer, H263Packetizer, H263RtpHeader};
    pub use crate::codec::t140::{T140Decoder, T140Encoder, T140Packetizer};
    pub use crate::media::{MediaPlayer, MediaRenderer, MediaRtpReceiver, MediaRtpSender};
    pub use crate::transport::{
        RtcpPacketReceiver, RtcpPacketTransmitter, RtpPacketReceiver, RtpPacketTransmitter,
    };
    pub use crate::{
        Buffer, Codec, Error, Format, MediaKind, Packet, ProcessResult, Result, RtcpEvent,
        RtcpEventListener, RtcpPacket, RtcpPacketType, RtpPacket, RtpSequenceNumber, RtpSource,
        RtpSsrc, RtpTimestamp,
    };
}
