use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Reception report block of SR and RR packets (RFC 3550 Section 6.4.1)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcpReportBlock {
    /// Source this block reports on
    pub ssrc: RtpSsrc,

    /// Loss since the previous report, in 1/256 units
    pub fraction_lost: u8,

    /// Cumulative packets lost, 24 bits on the wire
    pub cumulative_lost: u32,

    /// Extended highest sequence number received
    pub highest_seq: u32,

    /// Interarrival jitter in timestamp units
    pub jitter: u32,

    /// Compact NTP time of the last SR from this source
    pub last_sr: u32,

    /// Delay since that SR in 1/65536 seconds
    pub delay_since_last_sr: u32,
}

impl RtcpReportBlock {
    /// Encoded size
    pub const SIZE: usize = 24;

    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            ..Default::default()
        }
    }

    /// Fill the loss fields from expected and received packet counts
    pub fn set_loss(&mut self, expected: u32, received: u32) {
        let lost = expected.saturating_sub(received);
        self.cumulative_lost = lost.min(0x00ff_ffff);
        self.fraction_lost = if expected == 0 {
            0
        } else {
            ((lost as u64 * 256) / expected as u64).min(255) as u8
        };
    }

    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::SIZE,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let loss = buf.get_u32();
        Ok(Self {
            ssrc,
            fraction_lost: (loss >> 24) as u8,
            cumulative_lost: loss & 0x00ff_ffff,
            highest_seq: buf.get_u32(),
            jitter: buf.get_u32(),
            last_sr: buf.get_u32(),
            delay_since_last_sr: buf.get_u32(),
        })
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(Self::SIZE);
        buf.put_u32(self.ssrc);
        buf.put_u32((self.fraction_lost as u32) << 24 | (self.cumulative_lost & 0x00ff_ffff));
        buf.put_u32(self.highest_seq);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sr);
        buf.put_u32(self.delay_since_last_sr);
    }
}
