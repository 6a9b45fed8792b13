use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Goodbye packet (RFC 3550 Section 6.6)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcpGoodbye {
    /// Sources leaving the session
    pub sources: Vec<RtpSsrc>,

    /// Optional reason text
    pub reason: Option<String>,
}

impl RtcpGoodbye {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_source(ssrc: RtpSsrc) -> Self {
        Self {
            sources: vec![ssrc],
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn add_source(&mut self, ssrc: RtpSsrc) {
        self.sources.push(ssrc);
    }

    /// Body size, reason padded to 32 bits
    pub fn size(&self) -> usize {
        let reason = self
            .reason
            .as_ref()
            .map(|r| (1 + r.len().min(255) + 3) & !3)
            .unwrap_or(0);
        self.sources.len() * 4 + reason
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        for ssrc in &self.sources {
            buf.put_u32(*ssrc);
        }
        if let Some(reason) = &self.reason {
            let len = reason.len().min(255);
            buf.put_u8(len as u8);
            buf.put_slice(&reason.as_bytes()[..len]);
            for _ in 0..(4 - (1 + len) % 4) % 4 {
                buf.put_u8(0);
            }
        }
    }

    /// Decode a body announcing `count` sources; whatever follows is the reason
    pub fn parse(buf: &mut impl Buf, count: u8) -> Result<Self> {
        let required = count as usize * 4;
        if buf.remaining() < required {
            return Err(Error::BufferTooSmall {
                required,
                available: buf.remaining(),
            });
        }
        let sources = (0..count).map(|_| buf.get_u32()).collect();

        let reason = if buf.has_remaining() {
            let len = buf.get_u8() as usize;
            if buf.remaining() < len {
                return Err(Error::BufferTooSmall {
                    required: len,
                    available: buf.remaining(),
                });
            }
            let mut text = vec![0u8; len];
            buf.copy_to_slice(&mut text);
            let padding = (4 - (1 + len) % 4) % 4;
            buf.advance(padding.min(buf.remaining()));
            Some(String::from_utf8_lossy(&text).into_owned())
        } else {
            None
        };

        Ok(Self { sources, reason })
    }
}
