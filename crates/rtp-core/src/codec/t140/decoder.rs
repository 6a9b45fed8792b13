use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use super::{
    LOSS_CHAR, PRIMARY_HEADER_SIZE, REDUNDANT_HEADER_SIZE, RED_F_BIT, WAIT_FOR_MISSING_PACKET,
    WAIT_FOR_MISSING_PACKET_RED,
};
use crate::codec::{Codec, ProcessResult};
use crate::error::Error;
use crate::packet::Buffer;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Text(Bytes),
    Lost,
}

/// A decoded RED payload
#[derive(Debug, Clone, PartialEq, Eq)]
struct RedPayload {
    /// Redundant blocks, oldest first
    redundant: Vec<Bytes>,
    primary: Bytes,
}

fn parse_red(data: &Bytes, t140_payload_type: u8) -> Result<RedPayload> {
    let mut lengths = Vec::new();
    let mut pos = 0;
    while pos < data.len() && data[pos] & RED_F_BIT != 0 {
        if data[pos] & 0x7f != t140_payload_type {
            return Err(Error::InvalidPacket(format!(
                "redundant block of payload type {}",
                data[pos] & 0x7f
            )));
        }
        if pos + REDUNDANT_HEADER_SIZE > data.len() {
            return Err(Error::BufferTooSmall {
                required: pos + REDUNDANT_HEADER_SIZE,
                available: data.len(),
            });
        }
        lengths.push(((data[pos + 2] as usize & 0x03) << 8) | data[pos + 3] as usize);
        pos += REDUNDANT_HEADER_SIZE;
    }

    match data.get(pos) {
        Some(pt) if *pt == t140_payload_type => pos += PRIMARY_HEADER_SIZE,
        Some(pt) => {
            return Err(Error::InvalidPacket(format!("primary block of payload type {}", pt)))
        }
        None => {
            return Err(Error::InvalidPacket("RED payload without primary header".into()));
        }
    }

    let mut redundant = Vec::with_capacity(lengths.len());
    for len in lengths {
        if pos + len > data.len() {
            return Err(Error::BufferTooSmall {
                required: pos + len,
                available: data.len(),
            });
        }
        redundant.push(data.slice(pos..pos + len));
        pos += len;
    }

    Ok(RedPayload {
        redundant,
        primary: data.slice(pos..),
    })
}

/// Rebuilds the text stream from T.140 or RED payloads
///
/// Text is released strictly in sequence order. A gap stays open until the
/// missing text is recovered from the redundancy of a later packet or the
/// loss timeout expires, in which case a single U+FFFD stands for the
/// missing run.
#[derive(Debug)]
pub struct T140Decoder {
    t140_payload_type: u8,
    red_incoming: bool,
    loss_timeout: Duration,
    last_sequence: Option<i64>,
    last_output: i64,
    last_output_lost: bool,
    missing: HashMap<i64, Instant>,
    received: BTreeMap<i64, Block>,
}

impl T140Decoder {
    pub fn new(t140_payload_type: u8, red_incoming: bool) -> Self {
        let loss_timeout = if red_incoming {
            WAIT_FOR_MISSING_PACKET_RED
        } else {
            WAIT_FOR_MISSING_PACKET
        };
        Self {
            t140_payload_type: t140_payload_type & 0x7f,
            red_incoming,
            loss_timeout,
            last_sequence: None,
            last_output: 0,
            last_output_lost: false,
            missing: HashMap::new(),
            received: BTreeMap::new(),
        }
    }

    pub fn with_loss_timeout(mut self, timeout: Duration) -> Self {
        self.loss_timeout = timeout;
        self
    }

    /// Sequence numbers still waited for
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// Accept one payload and return the text that became available
    pub fn decode(&mut self, input: &Buffer, now: Instant) -> Result<Bytes> {
        let data = input.payload_bytes();
        let payload = if self.red_incoming {
            parse_red(&data, self.t140_payload_type)?
        } else {
            RedPayload {
                redundant: Vec::new(),
                primary: data,
            }
        };

        let sequence = self.extend_sequence(input.sequence_number as u16);
        let last = self.last_sequence.unwrap_or(sequence - 1);

        if sequence > last {
            for gap in (last + 1)..sequence {
                if !self.received.contains_key(&gap) {
                    self.missing.entry(gap).or_insert(now + self.loss_timeout);
                }
            }
            self.last_sequence = Some(sequence);
        }

        if sequence > self.last_output {
            self.missing.remove(&sequence);
            self.received
                .entry(sequence)
                .or_insert(Block::Text(payload.primary.clone()));
        }

        // The newest redundant block belongs to the previous packet
        for (generation, block) in payload.redundant.iter().rev().enumerate() {
            let recovered = sequence - 1 - generation as i64;
            if self.missing.remove(&recovered).is_some() {
                debug!("Recovered T.140 packet {} from redundancy", recovered);
                self.received.insert(recovered, Block::Text(block.clone()));
            }
        }

        self.expire(now);
        Ok(self.drain())
    }

    /// Declare overdue gaps lost and return the text that became available
    pub fn poll_losses(&mut self, now: Instant) -> Bytes {
        self.expire(now);
        self.drain()
    }

    fn extend_sequence(&mut self, sequence: u16) -> i64 {
        match self.last_sequence {
            None => {
                let extended = sequence as i64;
                self.last_output = extended - 1;
                extended
            }
            Some(last) => {
                let delta = sequence.wrapping_sub(last as u16) as i16;
                last + delta as i64
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        let overdue: Vec<i64> = self
            .missing
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in overdue {
            warn!("T.140 packet {} lost", seq);
            self.missing.remove(&seq);
            self.received.entry(seq).or_insert(Block::Lost);
        }
    }

    fn drain(&mut self) -> Bytes {
        let mut out = BytesMut::new();
        while let Some(block) = self.received.remove(&(self.last_output + 1)) {
            match block {
                Block::Text(text) => {
                    out.extend_from_slice(&text);
                    self.last_output_lost = false;
                }
                Block::Lost => {
                    if !self.last_output_lost {
                        out.extend_from_slice(LOSS_CHAR);
                    }
                    self.last_output_lost = true;
                }
            }
            self.last_output += 1;
        }
        out.freeze()
    }
}

impl Codec for T140Decoder {
    fn name(&self) -> &'static str {
        "t140-decoder"
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> ProcessResult {
        match self.decode(input, Instant::now()) {
            Ok(text) if text.is_empty() => ProcessResult::OutputNotFilled,
            Ok(text) => {
                output.copy_metadata_from(input);
                output.set_data(text);
                ProcessResult::Ok
            }
            Err(e) => {
                warn!("Dropping T.140 payload: {}", e);
                ProcessResult::Failed
            }
        }
    }

    fn reset(&mut self) {
        self.last_sequence = None;
        self.last_output = 0;
        self.last_output_lost = false;
        self.missing.clear();
        self.received.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::t140::{T140Encoder, TextBuffer};

    fn plain(text: &'static str, seq: u64) -> Buffer {
        let mut buffer = Buffer::from_data(text.as_bytes());
        buffer.sequence_number = seq;
        buffer
    }

    fn red_stream(texts: &[&'static str]) -> Vec<Buffer> {
        let mut encoder = T140Encoder::new(98, 2);
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let encoded = encoder.encode(&TextBuffer {
                    data: Bytes::from_static(text.as_bytes()),
                    timestamp: i as u64 * 300,
                    ..Default::default()
                });
                let mut buffer = Buffer::from_data(encoded.data);
                buffer.sequence_number = encoded.sequence_number;
                buffer
            })
            .collect()
    }

    #[test]
    fn test_in_order_plain_text() {
        let mut decoder = T140Decoder::new(98, false);
        let now = Instant::now();
        assert_eq!(&decoder.decode(&plain("he", 10), now).unwrap()[..], b"he");
        assert_eq!(&decoder.decode(&plain("llo", 11), now).unwrap()[..], b"llo");
    }

    #[test]
    fn test_reordered_plain_text() {
        let mut decoder = T140Decoder::new(98, false);
        let now = Instant::now();
        decoder.decode(&plain("a", 1), now).unwrap();
        assert!(decoder.decode(&plain("c", 3), now).unwrap().is_empty());
        assert_eq!(decoder.missing_count(), 1);
        assert_eq!(&decoder.decode(&plain("b", 2), now).unwrap()[..], b"bc");
        assert_eq!(decoder.missing_count(), 0);
    }

    #[test]
    fn test_loss_timeout_inserts_replacement_char() {
        let mut decoder = T140Decoder::new(98, false);
        let start = Instant::now();
        decoder.decode(&plain("a", 1), start).unwrap();
        decoder.decode(&plain("d", 4), start).unwrap();

        assert!(decoder.poll_losses(start + Duration::from_millis(100)).is_empty());

        let text = decoder.poll_losses(start + WAIT_FOR_MISSING_PACKET);
        let mut expected = LOSS_CHAR.to_vec();
        expected.push(b'd');
        // Two consecutive lost packets collapse into one marker
        assert_eq!(&text[..], &expected[..]);
    }

    #[test]
    fn test_red_recovers_lost_packets() {
        let packets = red_stream(&["a", "b", "c", "d"]);
        let mut decoder = T140Decoder::new(98, true);
        let now = Instant::now();

        assert_eq!(&decoder.decode(&packets[0], now).unwrap()[..], b"a");
        // "b" and "c" lost, both come back from the redundancy of "d"
        assert_eq!(&decoder.decode(&packets[3], now).unwrap()[..], b"bcd");
        assert_eq!(decoder.missing_count(), 0);
    }

    #[test]
    fn test_duplicate_packet_is_ignored() {
        let packets = red_stream(&["a", "b"]);
        let mut decoder = T140Decoder::new(98, true);
        let now = Instant::now();
        decoder.decode(&packets[0], now).unwrap();
        decoder.decode(&packets[1], now).unwrap();
        assert!(decoder.decode(&packets[1], now).unwrap().is_empty());
    }

    #[test]
    fn test_sequence_wrap() {
        let mut decoder = T140Decoder::new(98, false);
        let now = Instant::now();
        decoder.decode(&plain("x", 65535), now).unwrap();
        assert_eq!(&decoder.decode(&plain("y", 0), now).unwrap()[..], b"y");
    }

    #[test]
    fn test_malformed_red_payload() {
        let mut decoder = T140Decoder::new(98, true);
        let mut output = Buffer::new();
        let input = plain("\u{1}abc", 1);
        assert_eq!(decoder.process(&input, &mut output), ProcessResult::Failed);
    }

    #[test]
    fn test_parse_red() {
        let data = Bytes::from_static(&[0xe2, 0, 0, 1, 0xe2, 0, 0, 2, 98, b'a', b'b', b'c', b'd']);
        let payload = parse_red(&data, 98).unwrap();
        assert_eq!(payload.redundant, vec![Bytes::from_static(b"a"), Bytes::from_static(b"bc")]);
        assert_eq!(payload.primary, Bytes::from_static(b"d"));

        let short = Bytes::from_static(&[0xe2, 0, 0, 5, 98, b'a']);
        assert!(parse_red(&short, 98).is_err());
    }
}
