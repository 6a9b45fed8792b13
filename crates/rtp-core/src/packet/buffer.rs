use bytes::Bytes;

use crate::format::Format;

/// A unit of media travelling through a codec chain
///
/// Players produce buffers, codecs transform them and the RTP sender turns
/// them into packets; the receive path runs the other way. A packetizer that
/// splits one input into several packets puts them in `fragments`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    /// Backing data
    pub data: Bytes,

    /// Start of the media bytes within `data`
    pub offset: usize,

    /// Number of media bytes
    pub length: usize,

    /// Media timestamp
    pub timestamp: u64,

    /// Sequence number assigned by the producer
    pub sequence_number: u64,

    /// Format of the media bytes
    pub format: Option<Format>,

    /// `FLAG_*` bits
    pub flags: u32,

    /// Packets produced from this buffer, in send order
    pub fragments: Vec<Buffer>,
}

impl Buffer {
    /// End of media
    pub const FLAG_EOM: u32 = 0x0001;

    /// Drop this buffer without processing
    pub const FLAG_DISCARD: u32 = 0x0002;

    /// Set the RTP marker bit on the packet built from this buffer
    pub const FLAG_RTP_MARKER: u32 = 0x0800;

    /// `timestamp` is already in RTP clock units
    pub const FLAG_RTP_TIME: u32 = 0x1000;

    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer covering all of `data`
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        let mut buffer = Self::new();
        buffer.set_data(data);
        buffer
    }

    /// Replace the data and select all of it
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
        self.offset = 0;
        self.length = self.data.len();
    }

    /// The media bytes
    pub fn payload(&self) -> &[u8] {
        self.data
            .get(self.offset..self.offset + self.length)
            .unwrap_or(&[])
    }

    /// The media bytes as a cheap clone of the backing buffer
    pub fn payload_bytes(&self) -> Bytes {
        if self.offset + self.length > self.data.len() {
            return Bytes::new();
        }
        self.data.slice(self.offset..self.offset + self.length)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn is_discard(&self) -> bool {
        self.has_flag(Self::FLAG_DISCARD)
    }

    pub fn set_discard(&mut self, discard: bool) {
        self.set_flag(Self::FLAG_DISCARD, discard);
    }

    pub fn is_marker(&self) -> bool {
        self.has_flag(Self::FLAG_RTP_MARKER)
    }

    pub fn set_marker(&mut self, marker: bool) {
        self.set_flag(Self::FLAG_RTP_MARKER, marker);
    }

    pub fn is_eom(&self) -> bool {
        self.has_flag(Self::FLAG_EOM)
    }

    /// Copy everything except the data and the fragments
    pub fn copy_metadata_from(&mut self, other: &Buffer) {
        self.timestamp = other.timestamp;
        self.sequence_number = other.sequence_number;
        self.format = other.format.clone();
        self.flags = other.flags;
    }

    /// Reset to an empty buffer, keeping nothing
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
