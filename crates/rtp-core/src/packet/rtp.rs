use std::fmt;
use std::time::Instant;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::packet::Packet;
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp, RTP_VERSION};

/// An RTP data packet (RFC 3550 Section 5.1)
///
/// The payload is a range of a shared backing buffer, so packetizing a
/// frame or parsing a datagram never copies media bytes. Assembly always
/// writes the fixed 12-byte header: CSRC lists and header extensions are
/// accepted on receive but never produced.
#[derive(Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Marker bit, set on the last packet of a video frame
    pub marker: bool,

    /// 7-bit payload type
    pub payload_type: u8,

    /// Sequence number, wraps at 65535
    pub sequence_number: RtpSequenceNumber,

    /// Media timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source
    pub ssrc: RtpSsrc,

    /// Contributing sources found on receive
    pub csrc: Vec<RtpSsrc>,

    payload: Packet,
}

impl RtpPacket {
    /// Size of the fixed header
    pub const HEADER_SIZE: usize = 12;

    /// A packet carrying all of `payload`
    pub fn new(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        payload: Bytes,
    ) -> Self {
        Self {
            marker: false,
            payload_type: payload_type & 0x7f,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            payload: Packet::new(payload),
        }
    }

    /// A packet whose payload is `length` bytes at `offset` of `data`
    pub fn with_payload_range(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        data: Bytes,
        offset: usize,
        length: usize,
    ) -> Result<Self> {
        let mut packet = Self::new(payload_type, sequence_number, timestamp, ssrc, Bytes::new());
        packet.payload = Packet::with_range(data, offset, length)?;
        Ok(packet)
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    pub fn payload_bytes(&self) -> Bytes {
        self.payload.to_bytes()
    }

    pub fn payload_offset(&self) -> usize {
        self.payload.offset
    }

    pub fn payload_len(&self) -> usize {
        self.payload.length
    }

    pub fn received_at(&self) -> Option<Instant> {
        self.payload.received_at
    }

    pub fn set_received_at(&mut self, at: Instant) {
        self.payload.received_at = Some(at);
    }

    /// Size of the assembled packet
    pub fn calc_length(&self) -> usize {
        self.payload.length + Self::HEADER_SIZE
    }

    /// Write the fixed header followed by the payload
    pub fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.calc_length());

        buf.put_u8(RTP_VERSION << 6);
        let second = if self.marker {
            self.payload_type | 0x80
        } else {
            self.payload_type
        };
        buf.put_u8(second);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        buf.put_slice(self.payload());

        buf.freeze()
    }

    /// Decode a datagram
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::HEADER_SIZE,
                available: data.len(),
            });
        }

        let first = data[0];
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let padding = first & 0x20 != 0;
        let extension = first & 0x10 != 0;
        let csrc_count = (first & 0x0f) as usize;

        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7f;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut header_len = Self::HEADER_SIZE + csrc_count * 4;
        if data.len() < header_len {
            return Err(Error::BufferTooSmall {
                required: header_len,
                available: data.len(),
            });
        }
        let csrc = data[Self::HEADER_SIZE..header_len]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if extension {
            if data.len() < header_len + 4 {
                return Err(Error::BufferTooSmall {
                    required: header_len + 4,
                    available: data.len(),
                });
            }
            let words = u16::from_be_bytes([data[header_len + 2], data[header_len + 3]]) as usize;
            header_len += 4 + words * 4;
            if data.len() < header_len {
                return Err(Error::BufferTooSmall {
                    required: header_len,
                    available: data.len(),
                });
            }
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            if pad == 0 || pad > end - header_len {
                return Err(Error::InvalidPacket(format!("bad padding length {}", pad)));
            }
            end -= pad;
        }

        Ok(Self {
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            payload: Packet::with_range(data, header_len, end - header_len)?,
        })
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("marker", &self.marker)
            .field("payload_type", &self.payload_type)
            .field("sequence_number", &self.sequence_number)
            .field("timestamp", &self.timestamp)
            .field("ssrc", &format_args!("{:#010x}", self.ssrc))
            .field("payload_len", &self.payload_len())
            .finish()
    }
}
