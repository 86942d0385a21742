//! Frame assembly for the realtime socket.
//!
//! The backend sends most messages as a single text frame holding one JSON
//! document. Large messages are split: a frame holding only a decimal chunk
//! count comes first, followed by that many frames whose concatenation is the
//! logical message.
//!
//! # Wire Format
//!
//! ```text
//! {"t":"d","d":{...}}          single-frame message
//!
//! 3                            chunk-count header
//! {"t":"d","d":{"b":{"d       chunk 1
//! ":{"k1":{...}},"s":"o       chunk 2
//! k"}}}                        chunk 3
//! ```
//!
//! Frames that are neither a header, a chunk, nor a JSON object are logged
//! and dropped.

use futures::{future, Stream, StreamExt};
use tracing::{debug, warn};

/// Reassembles logical messages from raw text frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// Chunks still expected for the message being assembled.
    remaining: usize,
    buffer: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a chunked message is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.remaining > 0
    }

    /// Feed one frame, returning a complete logical message when one is ready.
    ///
    /// A header of `0` starts nothing; a header of `1` makes the next frame a
    /// one-chunk message.
    pub fn push(&mut self, frame: &str) -> Option<String> {
        if self.remaining > 0 {
            self.buffer.push_str(frame);
            self.remaining -= 1;
            if self.remaining == 0 {
                return Some(std::mem::take(&mut self.buffer));
            }
            return None;
        }

        if let Some(count) = parse_chunk_count(frame) {
            debug!(chunks = count, "Chunked message header");
            self.remaining = count;
            self.buffer.clear();
            return None;
        }

        if frame.starts_with('{') {
            return Some(frame.to_string());
        }

        warn!(frame = %frame, "Dropping non-JSON frame");
        None
    }
}

/// A frame counts as a header only if it is all ASCII digits.
fn parse_chunk_count(frame: &str) -> Option<usize> {
    if frame.is_empty() || !frame.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    frame.parse().ok()
}

/// Turn a stream of frames into a lazy stream of logical messages.
///
/// Transport errors pass through untouched so the reader can react to them.
pub fn assemble<S, E>(frames: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<String, E>>,
{
    let mut assembler = FrameAssembler::new();
    frames.filter_map(move |frame| {
        let out = match frame {
            Ok(text) => assembler.push(&text).map(Ok),
            Err(e) => Some(Err(e)),
        };
        future::ready(out)
    })
}
