use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use super::{PRIMARY_HEADER_SIZE, REDUNDANT_HEADER_SIZE, RED_F_BIT};

// The block length field is 10 bits wide
const MAX_BLOCK_LEN: usize = 0x3ff;

// The timestamp offset field is 14 bits wide
const TIMESTAMP_OFFSET_MASK: u64 = 0x3fff;

/// The text-level buffer the encoder works on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    pub data: Bytes,

    /// Milliseconds
    pub timestamp: u64,

    pub sequence_number: u64,

    /// First packet after an idle period
    pub marker: bool,
}

#[derive(Debug, Clone)]
struct RedundantBlock {
    timestamp: u64,
    data: Bytes,
}

/// Builds T.140 payloads, with RED framing when generations are configured
#[derive(Debug)]
pub struct T140Encoder {
    t140_payload_type: u8,
    generations: usize,
    history: VecDeque<RedundantBlock>,
    sequence_number: u64,
    idle: bool,
}

impl T140Encoder {
    /// `generations` of zero produces plain T.140 payloads
    pub fn new(t140_payload_type: u8, generations: usize) -> Self {
        Self {
            t140_payload_type: t140_payload_type & 0x7f,
            generations,
            history: VecDeque::with_capacity(generations),
            sequence_number: 1,
            idle: true,
        }
    }

    pub fn generations(&self) -> usize {
        self.generations
    }

    /// Skip one sequence number, returning the skipped value
    pub fn drop_sequence_number(&mut self) -> u64 {
        self.sequence_number += 1;
        self.sequence_number - 1
    }

    pub fn encode(&mut self, input: &TextBuffer) -> TextBuffer {
        let timestamp = input.timestamp;
        let mut out = BytesMut::with_capacity(
            self.generations * REDUNDANT_HEADER_SIZE + PRIMARY_HEADER_SIZE + input.data.len(),
        );

        if self.generations > 0 {
            // Empty generations until the history has filled up
            for _ in self.history.len()..self.generations {
                self.put_redundant_header(&mut out, 0, 0);
            }
            for block in &self.history {
                let offset = timestamp.wrapping_sub(block.timestamp) & TIMESTAMP_OFFSET_MASK;
                self.put_redundant_header(&mut out, offset as u16, block.data.len());
            }
            out.put_u8(self.t140_payload_type);
            for block in &self.history {
                out.put_slice(&block.data);
            }

            if self.history.len() >= self.generations {
                self.history.pop_front();
            }
            let mut data = input.data.clone();
            if data.len() > MAX_BLOCK_LEN {
                warn!("T.140 block of {} bytes too long for redundancy, truncated copy kept", data.len());
                data.truncate(MAX_BLOCK_LEN);
            }
            self.history.push_back(RedundantBlock { timestamp, data });
        }

        out.put_slice(&input.data);

        let marker = self.idle && !input.data.is_empty();
        self.idle = input.data.is_empty();

        let encoded = TextBuffer {
            data: out.freeze(),
            timestamp,
            sequence_number: self.sequence_number,
            marker,
        };
        self.sequence_number += 1;
        encoded
    }

    fn put_redundant_header(&self, out: &mut BytesMut, offset: u16, len: usize) {
        out.put_u8(RED_F_BIT | self.t140_payload_type);
        out.put_u8(((offset & 0x3fc0) >> 6) as u8);
        out.put_u8((((offset & 0x3f) << 2) as u8) | ((len & 0x300) >> 8) as u8);
        out.put_u8((len & 0xff) as u8);
    }
}
