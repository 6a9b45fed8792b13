use bytes::{Buf, BufMut, BytesMut};

use super::ntp::NtpTimestamp;
use super::report_block::RtcpReportBlock;
use crate::error::Error;
use crate::{Result, RtpSsrc, RtpTimestamp};

/// Sender information block of an SR
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderInfo {
    /// Wall clock time of the report
    pub ntp_timestamp: NtpTimestamp,

    /// The same instant on the media clock
    pub rtp_timestamp: RtpTimestamp,

    /// Packets sent since the session started
    pub packet_count: u32,

    /// Payload octets sent since the session started
    pub octet_count: u32,
}

impl SenderInfo {
    pub const SIZE: usize = 20;
}

/// RTCP Sender Report (RFC 3550 Section 6.4.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSenderReport {
    pub ssrc: RtpSsrc,
    pub sender_info: SenderInfo,
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpSenderReport {
    pub fn new(ssrc: RtpSsrc, sender_info: SenderInfo) -> Self {
        Self {
            ssrc,
            sender_info,
            report_blocks: Vec::new(),
        }
    }

    pub fn add_report_block(&mut self, block: RtcpReportBlock) {
        self.report_blocks.push(block);
    }

    /// Body size, without the common RTCP header
    pub fn size(&self) -> usize {
        4 + SenderInfo::SIZE + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_u32(self.ssrc);
        buf.put_u32(self.sender_info.ntp_timestamp.seconds);
        buf.put_u32(self.sender_info.ntp_timestamp.fraction);
        buf.put_u32(self.sender_info.rtp_timestamp);
        buf.put_u32(self.sender_info.packet_count);
        buf.put_u32(self.sender_info.octet_count);
        for block in &self.report_blocks {
            block.serialize(buf);
        }
    }

    /// Decode a body announcing `count` report blocks
    pub fn parse(buf: &mut impl Buf, count: u8) -> Result<Self> {
        let required = 4 + SenderInfo::SIZE;
        if buf.remaining() < required {
            return Err(Error::BufferTooSmall {
                required,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let sender_info = SenderInfo {
            ntp_timestamp: NtpTimestamp {
                seconds: buf.get_u32(),
                fraction: buf.get_u32(),
            },
            rtp_timestamp: buf.get_u32(),
            packet_count: buf.get_u32(),
            octet_count: buf.get_u32(),
        };
        let report_blocks = (0..count)
            .map(|_| RtcpReportBlock::parse(buf))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ssrc,
            sender_info,
            report_blocks,
        })
    }
}
