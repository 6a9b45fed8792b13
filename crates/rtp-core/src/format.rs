use std::fmt;

use rcs_infra_common::config::RtpSection;

/// The media family a format belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
    Text,
}

/// A negotiated payload format
///
/// One struct covers every codec; the codec name and payload type are what
/// the RTP layer and the SDP `a=rtpmap` attribute agree on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Format {
    /// Encoding name as it appears in `a=rtpmap`
    pub codec: String,

    /// RTP payload type
    pub payload_type: u8,

    /// Media clock rate in Hz
    pub clock_rate: u32,

    /// Audio, video or text
    pub kind: MediaKind,
}

impl Format {
    /// Dynamic payload type used for H.263-2000 by default
    pub const H263_PAYLOAD_TYPE: u8 = 97;

    /// Default T.140 payload type
    pub const T140_PAYLOAD_TYPE: u8 = 98;

    /// Default RED payload type
    pub const RED_PAYLOAD_TYPE: u8 = 99;

    pub fn new(codec: impl Into<String>, payload_type: u8, clock_rate: u32, kind: MediaKind) -> Self {
        Self {
            codec: codec.into(),
            payload_type,
            clock_rate,
            kind,
        }
    }

    /// H.263 (RFC 4629) video at 90 kHz
    pub fn h263_2000(payload_type: u8) -> Self {
        Self::new("H263-2000", payload_type, 90_000, MediaKind::Video)
    }

    /// G.711 mu-law, static payload type 0
    pub fn pcmu() -> Self {
        Self::new("PCMU", 0, 8_000, MediaKind::Audio)
    }

    /// T.140 real-time text at 1 kHz
    pub fn t140(payload_type: u8) -> Self {
        Self::new("t140", payload_type, 1_000, MediaKind::Text)
    }

    /// RFC 2198 redundant text at 1 kHz
    pub fn red(payload_type: u8) -> Self {
        Self::new("red", payload_type, 1_000, MediaKind::Text)
    }

    /// The text format to offer: RED when redundancy is configured, plain T.140 otherwise
    pub fn text(config: &RtpSection) -> Self {
        if config.t140_redundancy_generations > 0 {
            Self::red(config.red_payload_type)
        } else {
            Self::t140(config.t140_payload_type)
        }
    }

    /// Value of the matching `a=rtpmap` attribute
    pub fn rtpmap(&self) -> String {
        format!("{} {}/{}", self.payload_type, self.codec, self.clock_rate)
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (pt {})", self.codec, self.clock_rate, self.payload_type)
    }
}
