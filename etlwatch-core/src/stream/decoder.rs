//! Incremental frame decoder
//!
//! Turns byte chunks of arbitrary size into blank-line-delimited frames.
//! Chunk boundaries carry no meaning: a separator, a line or a multi-byte
//! character may be split across any number of `push` calls.

use tracing::warn;

use super::protocol::Protocol;

/// Largest unterminated frame kept before it is discarded
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// One complete frame with its data lines joined by `\n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug)]
pub struct FrameDecoder {
    data_field: String,
    pending_line: Vec<u8>,
    data_lines: Vec<String>,
    event: Option<String>,
    id: Option<String>,
    max_frame_bytes: usize,
    /// Skipping the rest of an oversized frame until the next blank line
    overflowed: bool,
}

impl FrameDecoder {
    pub fn new(protocol: &Protocol) -> Self {
        Self {
            data_field: protocol.data_field.clone(),
            pending_line: Vec::new(),
            data_lines: Vec::new(),
            event: None,
            id: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            overflowed: false,
        }
    }

    /// Overrides the cap on a single unterminated frame
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Feeds a chunk and returns every frame it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(newline) = rest.iter().position(|byte| *byte == b'\n') {
            self.pending_line.extend_from_slice(&rest[..newline]);
            rest = &rest[newline + 1..];
            self.complete_line(&mut frames);
            self.enforce_limit();
        }
        self.pending_line.extend_from_slice(rest);
        self.enforce_limit();

        frames
    }

    /// Bytes held back for a frame that has not been terminated yet
    pub fn pending_bytes(&self) -> usize {
        self.pending_line.len() + self.data_lines.iter().map(String::len).sum::<usize>()
    }

    pub fn has_partial_frame(&self) -> bool {
        !self.pending_line.is_empty() || !self.data_lines.is_empty()
    }

    fn complete_line(&mut self, frames: &mut Vec<Frame>) {
        let mut line = std::mem::take(&mut self.pending_line);
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        if self.overflowed {
            self.overflowed = !line.is_empty();
            return;
        }

        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }

        self.apply_line(&line);
    }

    fn enforce_limit(&mut self) {
        let pending = self.pending_bytes();
        if pending <= self.max_frame_bytes {
            return;
        }

        if !self.overflowed {
            warn!(
                "Discarding frame over {} bytes without a separator",
                self.max_frame_bytes
            );
        }
        self.pending_line.clear();
        self.data_lines.clear();
        self.event = None;
        self.id = None;
        self.overflowed = true;
    }

    fn apply_line(&mut self, line: &[u8]) {
        // comment / heartbeat
        if line.first() == Some(&b':') {
            return;
        }

        let text = String::from_utf8_lossy(line);
        let (field, value) = match text.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*text, ""),
        };

        if field == self.data_field {
            self.data_lines.push(value.to_string());
        } else if field == "event" {
            self.event = Some(value.to_string());
        } else if field == "id" {
            self.id = Some(value.to_string());
        }
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let event = self.event.take();
        let id = self.id.take();

        if self.data_lines.is_empty() {
            return None;
        }

        let data = self.data_lines.join("\n");
        self.data_lines.clear();

        Some(Frame { event, id, data })
    }
}
