use bytes::{Buf, BufMut, BytesMut};

use super::report_block::RtcpReportBlock;
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Receiver Report (RFC 3550 Section 6.4.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReceiverReport {
    /// Reporting receiver
    pub ssrc: RtpSsrc,

    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpReceiverReport {
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            report_blocks: Vec::new(),
        }
    }

    pub fn add_report_block(&mut self, block: RtcpReportBlock) {
        self.report_blocks.push(block);
    }

    /// Body size, without the common RTCP header
    pub fn size(&self) -> usize {
        4 + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_u32(self.ssrc);
        for block in &self.report_blocks {
            block.serialize(buf);
        }
    }

    /// Decode a body announcing `count` report blocks
    pub fn parse(buf: &mut impl Buf, count: u8) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall {
                required: 4,
                available: buf.remaining(),
            });
        }
        let ssrc = buf.get_u32();
        let report_blocks = (0..count)
            .map(|_| RtcpReportBlock::parse(buf))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ssrc, report_blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_parse() {
        let mut rr = RtcpReceiverReport::new(0x12345678);
        assert_eq!(rr.size(), 4);

        let mut block = RtcpReportBlock::new(0xabcdef01);
        block.jitter = 17;
        rr.add_report_block(block);
        rr.add_report_block(RtcpReportBlock::new(0x11223344));
        assert_eq!(rr.size(), 4 + 2 * RtcpReportBlock::SIZE);

        let mut buf = BytesMut::new();
        rr.serialize(&mut buf);
        let parsed = RtcpReceiverReport::parse(&mut buf.freeze(), 2).unwrap();
        assert_eq!(parsed, rr);
    }

    #[test]
    fn test_parse_missing_block() {
        let mut buf = BytesMut::new();
        RtcpReceiverReport::new(1).serialize(&mut buf);
        assert!(RtcpReceiverReport::parse(&mut buf.freeze(), 1).is_err());
    }
}
