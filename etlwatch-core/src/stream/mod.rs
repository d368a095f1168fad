//! Live log stream decoding
//!
//! Pure, transport-free decoding of the event stream: bytes go in, parsed
//! records and control signals come out. The client crate wires this to an
//! HTTP response body.

pub mod decoder;
pub mod parser;
pub mod protocol;

pub use decoder::{Frame, FrameDecoder};
pub use parser::{FrameError, Parsed, RecordParser};
pub use protocol::Protocol;

/// Frame decoder and record parser chained together
#[derive(Debug)]
pub struct LogStreamDecoder {
    frames: FrameDecoder,
    parser: RecordParser,
}

impl LogStreamDecoder {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            frames: FrameDecoder::new(&protocol),
            parser: RecordParser::new(protocol),
        }
    }

    /// Feeds a chunk and classifies every frame it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Parsed, FrameError>> {
        self.frames
            .push(chunk)
            .iter()
            .map(|frame| {
                tracing::trace!(event = ?frame.event, id = ?frame.id, "decoded frame");
                self.parser.parse(frame)
            })
            .collect()
    }

    pub fn pending_bytes(&self) -> usize {
        self.frames.pending_bytes()
    }
}

impl Default for LogStreamDecoder {
    fn default() -> Self {
        Self::new(Protocol::default())
    }
}
