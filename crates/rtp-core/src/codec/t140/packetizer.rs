use super::encoder::{T140Encoder, TextBuffer};
use crate::codec::{Codec, ProcessResult};
use crate::packet::Buffer;

/// Codec adapter around [`T140Encoder`]
///
/// Moves the media buffer into the encoder's [`TextBuffer`] and back, turning
/// the encoder's marker into [`Buffer::FLAG_RTP_MARKER`].
#[derive(Debug)]
pub struct T140Packetizer {
    encoder: T140Encoder,
}

impl T140Packetizer {
    pub fn new(t140_payload_type: u8, generations: usize) -> Self {
        Self {
            encoder: T140Encoder::new(t140_payload_type, generations),
        }
    }

    pub fn encoder(&self) -> &T140Encoder {
        &self.encoder
    }
}

fn to_text_buffer(src: &Buffer) -> TextBuffer {
    TextBuffer {
        data: src.payload_bytes(),
        timestamp: src.timestamp,
        sequence_number: src.sequence_number,
        marker: src.is_marker(),
    }
}

fn copy_text_buffer(src: &TextBuffer, dst: &mut Buffer) {
    dst.set_data(src.data.clone());
    dst.timestamp = src.timestamp;
    dst.sequence_number = src.sequence_number;
    if src.marker {
        dst.set_marker(true);
    }
}

impl Codec for T140Packetizer {
    fn name(&self) -> &'static str {
        "t140-packetizer"
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> ProcessResult {
        let text = to_text_buffer(input);
        let encoded = self.encoder.encode(&text);

        output.format = input.format.clone();
        output.flags = input.flags & !Buffer::FLAG_RTP_MARKER;
        copy_text_buffer(&encoded, output);
        ProcessResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;

    #[test]
    fn test_metadata_and_marker_translation() {
        let mut packetizer = T140Packetizer::new(98, 0);
        let mut input = Buffer::from_data(&b"hello"[..]);
        input.timestamp = 4242;
        input.format = Some(Format::t140(98));

        let mut output = Buffer::new();
        assert_eq!(packetizer.process(&input, &mut output), ProcessResult::Ok);
        assert_eq!(output.payload(), b"hello");
        assert_eq!(output.timestamp, 4242);
        assert_eq!(output.sequence_number, 1);
        assert!(output.is_marker());
        assert_eq!(output.format, Some(Format::t140(98)));

        let mut output = Buffer::new();
        packetizer.process(&Buffer::from_data(&b" world"[..]), &mut output);
        assert_eq!(output.sequence_number, 2);
        assert!(!output.is_marker());
    }

    #[test]
    fn test_red_payload() {
        let mut packetizer = T140Packetizer::new(98, 2);
        let mut output = Buffer::new();
        packetizer.process(&Buffer::from_data(&b"a"[..]), &mut output);
        assert_eq!(output.length, 2 * 4 + 1 + 1);
        assert_eq!(packetizer.encoder().generations(), 2);
    }
}
