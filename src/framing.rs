//! Reassembly of newline-delimited messages from BLE notification chunks.
//!
//! The sensing unit writes text lines over a characteristic whose payload is
//! limited by the negotiated MTU, so a single line may arrive split across
//! several notifications, and one notification may carry several lines.

use log::warn;

/// Message delimiter used by the device firmware.
pub const MESSAGE_DELIMITER: char = '\n';

/// Upper bound for buffered content that has not seen a delimiter yet.
///
/// A noisy link can leave the buffer without a terminator forever; beyond this
/// size the partial content is discarded together with the rest of its line.
pub const MAX_PARTIAL_LEN: usize = 4096;

/// Buffers partial lines and emits complete, trimmed, non-empty messages.
///
/// One reassembler belongs to one connection and must be [`reset`](Self::reset)
/// whenever a connection is established or torn down.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: String,
    // Set after an overflow until the next delimiter ends the corrupted line.
    discarding: bool,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every message it completes, in arrival order.
    ///
    /// The trailing fragment without a delimiter is kept for the next call.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let chunk = if self.discarding {
            match chunk.find(MESSAGE_DELIMITER) {
                Some(pos) => {
                    self.discarding = false;
                    &chunk[pos + 1..]
                }
                None => return Vec::new(),
            }
        } else {
            chunk
        };
        self.buffer.push_str(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.find(MESSAGE_DELIMITER) {
            let line: String = self.buffer.drain(..=pos).collect();
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                messages.push(trimmed.to_string());
            }
        }

        if self.buffer.len() > MAX_PARTIAL_LEN {
            warn!(
                "discarding {} bytes of unterminated data",
                self.buffer.len()
            );
            self.buffer.clear();
            self.discarding = true;
        }

        messages
    }

    /// Content received after the last delimiter.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drop any buffered partial content.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}
