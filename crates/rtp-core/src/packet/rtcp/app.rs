use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP application-defined packet (RFC 3550 Section 6.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpApplicationDefined {
    /// 5-bit subtype carried in the count field
    pub subtype: u8,

    pub ssrc: RtpSsrc,

    /// Four ASCII characters naming the application
    pub name: [u8; 4],

    /// Application data, padded to 32 bits on the wire
    pub data: Bytes,
}

impl RtcpApplicationDefined {
    pub fn new(subtype: u8, ssrc: RtpSsrc, name: [u8; 4], data: Bytes) -> Self {
        Self {
            subtype: subtype & 0x1f,
            ssrc,
            name,
            data,
        }
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn size(&self) -> usize {
        8 + ((self.data.len() + 3) & !3)
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put_slice(&self.data);
        for _ in 0..(4 - self.data.len() % 4) % 4 {
            buf.put_u8(0);
        }
    }

    /// Decode a body; `subtype` comes from the common header
    pub fn parse(buf: &mut impl Buf, subtype: u8) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(Error::BufferTooSmall {
                required: 8,
                available: buf.remaining(),
            });
        }
        let ssrc = buf.get_u32();
        let mut name = [0u8; 4];
        buf.copy_to_slice(&mut name);
        let data = buf.copy_to_bytes(buf.remaining());
        Ok(Self::new(subtype, ssrc, name, data))
    }
}
