use tracing::{trace, warn};

/// Buffers raw transport bytes and yields complete protocol lines
///
/// Bytes arriving without a terminating `\n` are held until a later read completes them. A `\r`
/// immediately before the terminator is stripped.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    truncated: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the pending buffer and drains every line whose terminator has now been
    /// observed, in arrival order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.buffer[consumed..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }

            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }

            consumed = end + 1;
        }

        self.buffer.drain(..consumed);
        trace!(
            lines = lines.len(),
            pending = self.buffer.len(),
            "frame reader fed"
        );

        lines
    }

    /// Signals end of stream; an unterminated fragment is discarded and counted
    ///
    /// Returns the discarded fragment's length in bytes, if there was one.
    pub fn finish(&mut self) -> Option<usize> {
        if self.buffer.is_empty() {
            return None;
        }

        let len = self.buffer.len();
        self.buffer.clear();
        self.truncated += 1;

        warn!(
            fragment_len = len,
            truncated_total = self.truncated,
            "discarding unterminated fragment at end of stream"
        );

        Some(len)
    }

    /// Number of unterminated fragments discarded so far
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
