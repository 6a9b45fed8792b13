use bytes::{Bytes, BytesMut};

/// Reassembly buffer for the chunks of one message
#[derive(Debug, Default)]
pub struct DataChunks {
    data: BytesMut,
}

impl DataChunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Bytes received so far
    pub fn current_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Take the received content and start over
    pub fn take(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    pub fn reset(&mut self) {
        self.data.clear();
    }
}
