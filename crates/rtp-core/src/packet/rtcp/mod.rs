//! RTCP packets (RFC 3550 Section 6).
//!
//! Every RTCP packet starts with the same 4-byte header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|  count  |      PT       |             length            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `length` is the packet size in 32-bit words minus one. Several packets are
//! usually stacked in one datagram, the compound packet, which
//! [`RtcpCompoundPacket::parse`] walks packet by packet.

pub mod app;
pub mod bye;
pub mod ntp;
pub mod receiver_report;
pub mod report_block;
pub mod sdes;
pub mod sender_report;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

pub use app::RtcpApplicationDefined;
pub use bye::RtcpGoodbye;
pub use ntp::NtpTimestamp;
pub use receiver_report::RtcpReceiverReport;
pub use report_block::RtcpReportBlock;
pub use sdes::{RtcpSdesChunk, RtcpSdesItem, RtcpSourceDescription};
pub use sender_report::{RtcpSenderReport, SenderInfo};

use crate::error::Error;
use crate::{Result, RTP_VERSION};

/// Size of the common header
pub const RTCP_HEADER_SIZE: usize = 4;

/// RTCP packet type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtcpPacketType {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Goodbye,
    ApplicationDefined,
    /// Several packets in one datagram
    Compound,
}

impl RtcpPacketType {
    /// Wire code; the compound pseudo-type has none and reports -1
    pub fn code(self) -> i16 {
        match self {
            RtcpPacketType::SenderReport => 200,
            RtcpPacketType::ReceiverReport => 201,
            RtcpPacketType::SourceDescription => 202,
            RtcpPacketType::Goodbye => 203,
            RtcpPacketType::ApplicationDefined => 204,
            RtcpPacketType::Compound => -1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            200 => Some(RtcpPacketType::SenderReport),
            201 => Some(RtcpPacketType::ReceiverReport),
            202 => Some(RtcpPacketType::SourceDescription),
            203 => Some(RtcpPacketType::Goodbye),
            204 => Some(RtcpPacketType::ApplicationDefined),
            _ => None,
        }
    }
}

impl fmt::Display for RtcpPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RtcpPacketType::SenderReport => "SR",
            RtcpPacketType::ReceiverReport => "RR",
            RtcpPacketType::SourceDescription => "SDES",
            RtcpPacketType::Goodbye => "BYE",
            RtcpPacketType::ApplicationDefined => "APP",
            RtcpPacketType::Compound => "COMPOUND",
        };
        f.write_str(name)
    }
}

/// A single RTCP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(RtcpSenderReport),
    ReceiverReport(RtcpReceiverReport),
    SourceDescription(RtcpSourceDescription),
    Goodbye(RtcpGoodbye),
    ApplicationDefined(RtcpApplicationDefined),
}

impl RtcpPacket {
    pub fn packet_type(&self) -> RtcpPacketType {
        match self {
            RtcpPacket::SenderReport(_) => RtcpPacketType::SenderReport,
            RtcpPacket::ReceiverReport(_) => RtcpPacketType::ReceiverReport,
            RtcpPacket::SourceDescription(_) => RtcpPacketType::SourceDescription,
            RtcpPacket::Goodbye(_) => RtcpPacketType::Goodbye,
            RtcpPacket::ApplicationDefined(_) => RtcpPacketType::ApplicationDefined,
        }
    }

    // Value of the 5-bit count field
    fn count(&self) -> Result<u8> {
        let count = match self {
            RtcpPacket::SenderReport(sr) => sr.report_blocks.len(),
            RtcpPacket::ReceiverReport(rr) => rr.report_blocks.len(),
            RtcpPacket::SourceDescription(sdes) => sdes.chunks.len(),
            RtcpPacket::Goodbye(bye) => bye.sources.len(),
            RtcpPacket::ApplicationDefined(app) => app.subtype as usize,
        };
        if count > 31 {
            return Err(Error::InvalidPacket(format!(
                "{} packet carries {} entries, at most 31 fit",
                self.packet_type(),
                count
            )));
        }
        Ok(count as u8)
    }

    /// Encoded size including the common header
    pub fn calc_length(&self) -> usize {
        RTCP_HEADER_SIZE
            + match self {
                RtcpPacket::SenderReport(sr) => sr.size(),
                RtcpPacket::ReceiverReport(rr) => rr.size(),
                RtcpPacket::SourceDescription(sdes) => sdes.size(),
                RtcpPacket::Goodbye(bye) => bye.size(),
                RtcpPacket::ApplicationDefined(app) => app.size(),
            }
    }

    /// Append the packet, header included, to `buf`
    pub fn assemble(&self, buf: &mut BytesMut) -> Result<()> {
        let length = self.calc_length();
        let words = (length / 4 - 1) as u16;

        buf.reserve(length);
        buf.put_u8(RTP_VERSION << 6 | self.count()?);
        buf.put_u8(self.packet_type().code() as u8);
        buf.put_u16(words);

        match self {
            RtcpPacket::SenderReport(sr) => sr.serialize(buf),
            RtcpPacket::ReceiverReport(rr) => rr.serialize(buf),
            RtcpPacket::SourceDescription(sdes) => sdes.serialize(buf),
            RtcpPacket::Goodbye(bye) => bye.serialize(buf),
            RtcpPacket::ApplicationDefined(app) => app.serialize(buf),
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.calc_length());
        self.assemble(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode the first packet of `data`, returning it and its encoded size
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < RTCP_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTCP_HEADER_SIZE,
                available: data.len(),
            });
        }

        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let padding = data[0] & 0x20 != 0;
        let count = data[0] & 0x1f;
        let code = data[1];
        let length = (u16::from_be_bytes([data[2], data[3]]) as usize + 1) * 4;
        if data.len() < length {
            return Err(Error::BufferTooSmall {
                required: length,
                available: data.len(),
            });
        }

        let mut body_end = length;
        if padding {
            let pad = data[length - 1] as usize;
            if pad == 0 || pad > length - RTCP_HEADER_SIZE {
                return Err(Error::InvalidPacket(format!("bad RTCP padding length {}", pad)));
            }
            body_end -= pad;
        }
        let mut body = &data[RTCP_HEADER_SIZE..body_end];

        let packet = match RtcpPacketType::from_code(code) {
            Some(RtcpPacketType::SenderReport) => {
                RtcpPacket::SenderReport(RtcpSenderReport::parse(&mut body, count)?)
            }
            Some(RtcpPacketType::ReceiverReport) => {
                RtcpPacket::ReceiverReport(RtcpReceiverReport::parse(&mut body, count)?)
            }
            Some(RtcpPacketType::SourceDescription) => {
                RtcpPacket::SourceDescription(RtcpSourceDescription::parse(&mut body, count)?)
            }
            Some(RtcpPacketType::Goodbye) => {
                RtcpPacket::Goodbye(RtcpGoodbye::parse(&mut body, count)?)
            }
            Some(RtcpPacketType::ApplicationDefined) => RtcpPacket::ApplicationDefined(
                RtcpApplicationDefined::parse(&mut body, count)?,
            ),
            Some(RtcpPacketType::Compound) | None => {
                return Err(Error::InvalidPacket(format!("unknown RTCP packet type {}", code)));
            }
        };

        Ok((packet, length))
    }
}

/// Several RTCP packets sent in one datagram
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcpCompoundPacket {
    pub packets: Vec<RtcpPacket>,
}

impl RtcpCompoundPacket {
    pub fn new(packets: Vec<RtcpPacket>) -> Self {
        Self { packets }
    }

    pub fn packet_type(&self) -> RtcpPacketType {
        RtcpPacketType::Compound
    }

    pub fn push(&mut self, packet: RtcpPacket) {
        self.packets.push(packet);
    }

    pub fn calc_length(&self) -> usize {
        self.packets.iter().map(RtcpPacket::calc_length).sum()
    }

    pub fn assemble(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.calc_length());
        for packet in &self.packets {
            packet.assemble(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Walk every packet of a datagram
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut packets = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let (packet, used) = RtcpPacket::parse(rest)?;
            packets.push(packet);
            rest = &rest[used..];
        }
        if packets.is_empty() {
            return Err(Error::InvalidPacket("empty RTCP datagram".into()));
        }
        Ok(Self { packets })
    }
}
