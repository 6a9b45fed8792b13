//! Codec chain elements.
//!
//! A codec turns one [`Buffer`] into another. Packetizers sit at the end of
//! the sending chain and may split a frame into several RTP-sized
//! [`Buffer::fragments`]; depacketizers sit at the start of the receiving
//! chain and may need several packets before they produce anything.

pub mod h263;
pub mod t140;

use rcs_infra_common::config::RtpSection;
use tracing::{trace, warn};

use crate::error::Error;
use crate::format::Format;
use crate::packet::Buffer;
use crate::Result;

use self::h263::{H263Depacketizer, H263Packetizer};
use self::t140::{T140Decoder, T140Packetizer};

/// Outcome of [`Codec::process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// `output` holds a result
    Ok,
    /// The input was consumed but nothing is ready yet
    OutputNotFilled,
    /// The codec could not handle the input
    Failed,
}

/// One processing step of a media pipeline
pub trait Codec: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Transform `input` into `output`
    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> ProcessResult;

    /// Drop any state carried between buffers
    fn reset(&mut self) {}
}

/// An ordered list of codecs applied to every buffer
#[derive(Default)]
pub struct CodecChain {
    codecs: Vec<Box<dyn Codec>>,
}

impl CodecChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codecs.push(Box::new(codec));
        self
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Run `input` through every codec
    ///
    /// Returns the buffers that come out of the last codec, in order. A codec
    /// that produces fragments feeds each fragment to the rest of the chain.
    pub fn process(&mut self, input: Buffer) -> Result<Vec<Buffer>> {
        self.process_from(0, input)
    }

    fn process_from(&mut self, start: usize, input: Buffer) -> Result<Vec<Buffer>> {
        let mut current = input;
        for index in start..self.codecs.len() {
            if current.is_discard() {
                return Ok(Vec::new());
            }

            let mut output = Buffer::new();
            let codec = &mut self.codecs[index];
            match codec.process(&current, &mut output) {
                ProcessResult::Ok => {}
                ProcessResult::OutputNotFilled => {
                    trace!("{} is waiting for more input", codec.name());
                    return Ok(Vec::new());
                }
                ProcessResult::Failed => {
                    warn!("{} failed to process a buffer", codec.name());
                    return Err(Error::Codec(format!("{} failed", codec.name())));
                }
            }

            if !output.fragments.is_empty() {
                let fragments = std::mem::take(&mut output.fragments);
                let mut results = Vec::with_capacity(fragments.len());
                for fragment in fragments {
                    results.extend(self.process_from(index + 1, fragment)?);
                }
                return Ok(results);
            }
            current = output;
        }

        if current.is_discard() {
            return Ok(Vec::new());
        }
        Ok(vec![current])
    }

    pub fn reset(&mut self) {
        for codec in &mut self.codecs {
            codec.reset();
        }
    }
}

/// Codecs turning player output into RTP-ready buffers for `format`
pub fn encoding_chain(format: &Format, config: &RtpSection) -> CodecChain {
    match format.codec.to_ascii_lowercase().as_str() {
        "h263-2000" | "h263-1998" | "h263" => {
            CodecChain::new().with_codec(H263Packetizer::new(config.max_h263_payload_size))
        }
        "t140" => CodecChain::new().with_codec(T140Packetizer::new(format.payload_type, 0)),
        "red" => CodecChain::new().with_codec(T140Packetizer::new(
            config.t140_payload_type,
            config.t140_redundancy_generations,
        )),
        _ => CodecChain::new(),
    }
}

/// Codecs turning received RTP payloads into renderer input for `format`
pub fn decoding_chain(format: &Format, config: &RtpSection) -> CodecChain {
    match format.codec.to_ascii_lowercase().as_str() {
        "h263-2000" | "h263-1998" | "h263" => CodecChain::new().with_codec(H263Depacketizer::new()),
        "t140" => CodecChain::new().with_codec(T140Decoder::new(format.payload_type, false)),
        "red" => CodecChain::new().with_codec(T140Decoder::new(config.t140_payload_type, true)),
        _ => CodecChain::new(),
    }
}
