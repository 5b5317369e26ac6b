//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 12 bytes
//! - `WaitingForBody`: Header parsed, need meta + payload bytes
//!
//! Header validation (magic, declared lengths) happens before the body is
//! awaited, so a corrupt length field never causes a proportional
//! allocation. Frame extraction is all-or-nothing: a frame either comes
//! out whole or the input is left buffered untouched.

use bytes::{Bytes, BytesMut};

use super::frame::{Frame, FrameMeta};
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header (need 12 bytes).
    WaitingForHeader,
    /// Header parsed and validated, waiting for meta + payload bytes.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64 KiB, max payload: 64 MiB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with a custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming data from the socket.
    /// Returns the complete frames found; fragmented remainder is kept for
    /// the next push.
    ///
    /// # Errors
    ///
    /// Returns `FrameCorrupt` if the header fails validation or the meta
    /// block cannot be decoded. The buffer is unusable afterwards; the
    /// connection must be torn down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(FrameCorrupt)` on protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let Some(header) = Header::decode(&self.buffer) else {
                    return Ok(None);
                };

                // Reject bogus sizes before buffering a body for them.
                header.validate(self.max_payload_size)?;

                let _ = self.buffer.split_to(HEADER_SIZE);
                self.state = State::WaitingForBody { header };

                // The body may already be buffered.
                self.try_extract_one()
            }

            State::WaitingForBody { header } => {
                let header = *header;
                if self.buffer.len() < header.body_len() {
                    return Ok(None);
                }

                let meta_bytes = self.buffer.split_to(header.meta_len as usize);
                let meta = FrameMeta::decode(&meta_bytes)?;
                let payload: Bytes = self.buffer.split_to(header.payload_len as usize).freeze();

                self.state = State::WaitingForHeader;
                Ok(Some(Frame::new(meta, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
