use anyhow::Result;
use std::collections::VecDeque;

/// Byte buffer that yields complete lines
///
/// Lines are only decoded once their terminating `\n` has arrived, so a
/// multi-byte UTF-8 sequence split across network chunks is never decoded
/// half-way.
pub struct LineBuffer {
    buffer: VecDeque<u8>,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line, trimmed (handles `\r\n`).
    /// `None` when no newline is buffered yet.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        Some(decode(&line_bytes))
    }

    /// Whatever is left once the byte stream has ended (a final line
    /// without trailing newline)
    pub fn take_remaining(&mut self) -> Option<Result<String>> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest: Vec<u8> = self.buffer.drain(..).collect();
        Some(decode(&rest))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn decode(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8: {}", e))
}
