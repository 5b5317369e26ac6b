//! Frame and meta block types.
//!
//! A frame is the unit of exchange on a connection: a meta block that
//! routes and correlates the message, plus an opaque payload. The payload's
//! internal structure belongs entirely to the caller; the core never
//! interprets it.
//!
//! # Example
//!
//! ```
//! use wirecall::protocol::{Frame, FrameMeta};
//! use bytes::Bytes;
//!
//! let meta = FrameMeta::request(42, "Echo", "Echo");
//! let frame = Frame::new(meta, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.id(), 42);
//! assert!(frame.is_request());
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{Result, WirecallError};

/// Direction of a frame: a call going out, or its answer coming back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A method invocation addressed to a service.
    Request,
    /// The answer to a previously sent request, matched by id.
    Response,
}

/// Meta block carried ahead of the payload in every frame.
///
/// Serialized as a MessagePack map (struct-as-map, field names on the
/// wire) so both sides can evolve the block without positional breakage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Correlation id. Allocated by the calling side, echoed back in the
    /// response.
    pub id: u64,
    /// Request or response.
    pub kind: FrameKind,
    /// Target service name.
    pub service: String,
    /// Target method name.
    pub method: String,
    /// Whether the call failed on the remote side.
    pub failed: bool,
    /// Failure description; present only when `failed`.
    pub error_text: Option<String>,
}

impl FrameMeta {
    /// Meta block for an outgoing request.
    pub fn request(id: u64, service: &str, method: &str) -> Self {
        Self {
            id,
            kind: FrameKind::Request,
            service: service.to_string(),
            method: method.to_string(),
            failed: false,
            error_text: None,
        }
    }

    /// Meta block for a successful response. Echoes the request's routing
    /// fields; correlation is by id alone.
    pub fn response(id: u64, service: &str, method: &str) -> Self {
        Self {
            id,
            kind: FrameKind::Response,
            service: service.to_string(),
            method: method.to_string(),
            failed: false,
            error_text: None,
        }
    }

    /// Meta block for a failed response carrying an error description.
    pub fn failed_response(
        id: u64,
        service: &str,
        method: &str,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind: FrameKind::Response,
            service: service.to_string(),
            method: method.to_string(),
            failed: true,
            error_text: Some(error_text.into()),
        }
    }

    /// Check if this is a request.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.kind == FrameKind::Request
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind == FrameKind::Response
    }

    /// Encode the meta block to MessagePack bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode a meta block from MessagePack bytes.
    ///
    /// A meta block that fails to parse means the stream is corrupt, not
    /// just this message, so the error is connection-fatal.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| WirecallError::FrameCorrupt(format!("bad meta block: {e}")))
    }
}

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded meta block.
    pub meta: FrameMeta,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from meta and payload.
    pub fn new(meta: FrameMeta, payload: Bytes) -> Self {
        Self { meta, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the correlation id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Check if this is a request.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.meta.is_request()
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.meta.is_response()
    }

    /// Check if this frame reports a failure.
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.meta.failed
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and meta block and appends the payload into a
/// contiguous buffer. The send path keeps the three parts separate for
/// vectored writes; this helper exists for tests and tools.
pub fn build_frame(meta: &FrameMeta, payload: &[u8]) -> Result<Vec<u8>> {
    let meta_bytes = meta.encode()?;
    let header = Header::new(meta_bytes.len() as u32, payload.len() as u32);

    let mut buf = Vec::with_capacity(HEADER_SIZE + meta_bytes.len() + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&meta_bytes);
    buf.extend_from_slice(payload);
    Ok(buf)
}
