use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// SDES item types (RFC 3550 Section 6.5)
pub mod item_type {
    pub const END: u8 = 0;
    pub const CNAME: u8 = 1;
    pub const NAME: u8 = 2;
    pub const EMAIL: u8 = 3;
    pub const PHONE: u8 = 4;
    pub const LOC: u8 = 5;
    pub const TOOL: u8 = 6;
    pub const NOTE: u8 = 7;
    pub const PRIV: u8 = 8;
}

/// One `type/length/text` item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSdesItem {
    pub item_type: u8,
    pub value: String,
}

impl RtcpSdesItem {
    pub fn new(item_type: u8, value: impl Into<String>) -> Self {
        Self {
            item_type,
            value: value.into(),
        }
    }

    pub fn cname(value: impl Into<String>) -> Self {
        Self::new(item_type::CNAME, value)
    }

    fn encoded_len(&self) -> usize {
        2 + self.value.len().min(255)
    }
}

/// The items describing one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSdesChunk {
    pub ssrc: RtpSsrc,
    pub items: Vec<RtcpSdesItem>,
}

impl RtcpSdesChunk {
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: RtcpSdesItem) -> Self {
        self.items.push(item);
        self
    }

    /// Encoded size: SSRC, items, at least one END byte, padded to 32 bits
    pub fn size(&self) -> usize {
        let raw = 4 + self.items.iter().map(RtcpSdesItem::encoded_len).sum::<usize>() + 1;
        (raw + 3) & !3
    }

    fn serialize(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u32(self.ssrc);
        for item in &self.items {
            let len = item.value.len().min(255);
            buf.put_u8(item.item_type);
            buf.put_u8(len as u8);
            buf.put_slice(&item.value.as_bytes()[..len]);
        }
        buf.put_u8(item_type::END);
        while (buf.len() - start) % 4 != 0 {
            buf.put_u8(0);
        }
    }

    fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall {
                required: 4,
                available: buf.remaining(),
            });
        }
        let ssrc = buf.get_u32();
        let mut consumed = 4;
        let mut items = Vec::new();

        loop {
            if !buf.has_remaining() {
                return Err(Error::InvalidPacket("SDES chunk without END item".into()));
            }
            let kind = buf.get_u8();
            consumed += 1;
            if kind == item_type::END {
                break;
            }
            if !buf.has_remaining() {
                return Err(Error::BufferTooSmall {
                    required: 1,
                    available: 0,
                });
            }
            let len = buf.get_u8() as usize;
            consumed += 1;
            if buf.remaining() < len {
                return Err(Error::BufferTooSmall {
                    required: len,
                    available: buf.remaining(),
                });
            }
            let mut text = vec![0u8; len];
            buf.copy_to_slice(&mut text);
            consumed += len;
            items.push(RtcpSdesItem::new(kind, String::from_utf8_lossy(&text)));
        }

        let padding = (4 - consumed % 4) % 4;
        buf.advance(padding.min(buf.remaining()));

        Ok(Self { ssrc, items })
    }
}

/// RTCP Source Description packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcpSourceDescription {
    pub chunks: Vec<RtcpSdesChunk>,
}

impl RtcpSourceDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual single-chunk packet announcing a CNAME
    pub fn with_cname(ssrc: RtpSsrc, cname: impl Into<String>) -> Self {
        Self {
            chunks: vec![RtcpSdesChunk::new(ssrc).with_item(RtcpSdesItem::cname(cname))],
        }
    }

    pub fn add_chunk(&mut self, chunk: RtcpSdesChunk) {
        self.chunks.push(chunk);
    }

    /// First CNAME announced for `ssrc`
    pub fn cname(&self, ssrc: RtpSsrc) -> Option<&str> {
        self.chunks
            .iter()
            .filter(|chunk| chunk.ssrc == ssrc)
            .flat_map(|chunk| chunk.items.iter())
            .find(|item| item.item_type == item_type::CNAME)
            .map(|item| item.value.as_str())
    }

    pub fn size(&self) -> usize {
        self.chunks.iter().map(RtcpSdesChunk::size).sum()
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        for chunk in &self.chunks {
            chunk.serialize(buf);
        }
    }

    /// Decode a body announcing `count` chunks
    pub fn parse(buf: &mut impl Buf, count: u8) -> Result<Self> {
        let chunks = (0..count)
            .map(|_| RtcpSdesChunk::parse(buf))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { chunks })
    }
}
