use tracing::warn;

/// Upper bound on bytes buffered while waiting for a newline. A device that
/// stops terminating lines would otherwise grow the buffer without limit.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Accumulates raw serial bytes and splits out complete newline-terminated
/// lines, keeping any trailing fragment buffered for the next read.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Feed a chunk of raw bytes, returning every line it completes.
    ///
    /// Lines are decoded as UTF-8 best-effort (invalid sequences become
    /// replacement characters) and trimmed of surrounding whitespace. Decoding
    /// happens per complete line, so the emitted lines are the same whether
    /// the input arrives byte-by-byte or in one chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let consumed: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&consumed[..pos]);
            lines.push(text.trim().to_owned());
        }

        if self.buffer.len() > MAX_PENDING_BYTES {
            warn!(
                pending = self.buffer.len(),
                "discarding oversized fragment with no newline"
            );
            self.buffer.clear();
        }

        lines
    }

    /// Bytes buffered for an incomplete trailing line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any buffered fragment. Called on disconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
