use std::time::Instant;

use bytes::Bytes;

use crate::error::Error;
use crate::Result;

/// A byte range inside a shared backing buffer
///
/// RTP and RTCP packets both sit on top of this: `data` is the whole
/// datagram (or the frame being packetized) and `offset`/`length` select the
/// part that belongs to the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Backing buffer
    pub data: Bytes,

    /// Start of the packet within `data`
    pub offset: usize,

    /// Number of bytes from `offset`
    pub length: usize,

    /// When the datagram came off the socket, for received packets
    pub received_at: Option<Instant>,
}

impl Packet {
    /// Wrap a whole buffer
    pub fn new(data: Bytes) -> Self {
        let length = data.len();
        Self {
            data,
            offset: 0,
            length,
            received_at: None,
        }
    }

    /// Select `length` bytes at `offset` in `data`
    pub fn with_range(data: Bytes, offset: usize, length: usize) -> Result<Self> {
        let end = offset.checked_add(length).ok_or_else(|| {
            Error::InvalidPacket(format!("range {}+{} overflows", offset, length))
        })?;
        if end > data.len() {
            return Err(Error::BufferTooSmall {
                required: end,
                available: data.len(),
            });
        }
        Ok(Self {
            data,
            offset,
            length,
            received_at: None,
        })
    }

    /// A datagram just read from the network
    pub fn received(data: Bytes, at: Instant) -> Self {
        let mut packet = Self::new(data);
        packet.received_at = Some(at);
        packet
    }

    /// The selected bytes
    pub fn as_slice(&self) -> &[u8] {
        self.data
            .get(self.offset..self.offset + self.length)
            .unwrap_or(&[])
    }

    /// The selected bytes as a cheap clone of the backing buffer
    pub fn to_bytes(&self) -> Bytes {
        if self.offset + self.length > self.data.len() {
            return Bytes::new();
        }
        self.data.slice(self.offset..self.offset + self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
