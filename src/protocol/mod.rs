//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary envelope for a connection:
//! - 12-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame and meta block types

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame, FrameKind, FrameMeta};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, MAGIC, MAX_META_SIZE};
