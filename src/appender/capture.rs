//! Capturing Sink
//!
//! Records every drained chunk; used by unit and integration tests the way a
//! loopback test device stands in for a real transport. Each `consume` call
//! drains everything available, so one recorded chunk corresponds to one
//! contiguous coalesced block.

use parking_lot::Mutex;
use tracing::trace;

use super::{AppendSink, DrainQueue};

/// Sink that keeps everything it consumes.
pub struct CaptureSink {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, chunk: &[u8]) {
        trace!(len = chunk.len(), "capture sink chunk");
        self.chunks.lock().push(chunk.to_vec());
    }

    /// Every recorded chunk, in consumption order.
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().clone()
    }

    /// All recorded bytes, concatenated.
    pub fn concat(&self) -> Vec<u8> {
        self.chunks.lock().iter().flatten().copied().collect()
    }

    pub fn clear(&self) {
        self.chunks.lock().clear();
    }
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AppendSink for CaptureSink {
    fn consume(&self, buf: &mut DrainQueue) {
        while let Some(chunk) = buf.chunk() {
            let n = chunk.len();
            self.record(chunk);
            buf.pop_consumed(n);
        }
    }
}
