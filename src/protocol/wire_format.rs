//! Wire format encoding and decoding.
//!
//! Implements the 12-byte header format:
//! ```text
//! ┌──────────┬──────────┬──────────┐
//! │ Magic    │ Meta len │ Payload  │
//! │ 4 bytes  │ 4 bytes  │ len      │
//! │ uint32 BE│ uint32 BE│ 4 bytes  │
//! │          │          │ uint32 BE│
//! └──────────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The header is followed by a
//! MessagePack-encoded meta block of `meta_len` bytes, then `payload_len`
//! raw payload bytes.

use crate::error::{Result, WirecallError};

/// Magic/version tag, ASCII "RPC1". Bump the trailing byte on breaking
/// wire changes.
pub const MAGIC: u32 = 0x5250_4331;

/// Header size in bytes (fixed, exactly 12).
pub const HEADER_SIZE: usize = 12;

/// Hard ceiling on the meta block size. The meta block only carries an id,
/// routing strings, and an error text, so 64 KiB is already generous.
pub const MAX_META_SIZE: u32 = 64 * 1024;

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic/version tag; must equal [`MAGIC`].
    pub magic: u32,
    /// Length of the meta block in bytes.
    pub meta_len: u32,
    /// Length of the raw payload in bytes.
    pub payload_len: u32,
}

impl Header {
    /// Create a new header with the current magic.
    pub fn new(meta_len: u32, payload_len: u32) -> Self {
        Self {
            magic: MAGIC,
            meta_len,
            payload_len,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use wirecall::protocol::Header;
    ///
    /// let header = Header::new(32, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 12);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (12 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..8].copy_from_slice(&self.meta_len.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if fewer than `HEADER_SIZE` bytes are available, so
    /// callers can keep accumulating input without consuming anything.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            meta_len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            payload_len: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Validate the header before any length-proportional allocation.
    ///
    /// Checks:
    /// - Magic/version tag matches
    /// - Meta block is non-empty and within [`MAX_META_SIZE`]
    /// - Payload length doesn't exceed `max_payload_size`
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.magic != MAGIC {
            return Err(WirecallError::FrameCorrupt(format!(
                "bad magic {:#010x}, expected {:#010x}",
                self.magic, MAGIC
            )));
        }

        if self.meta_len == 0 {
            return Err(WirecallError::FrameCorrupt(
                "empty meta block".to_string(),
            ));
        }

        if self.meta_len > MAX_META_SIZE {
            return Err(WirecallError::FrameCorrupt(format!(
                "meta size {} exceeds maximum {}",
                self.meta_len, MAX_META_SIZE
            )));
        }

        if self.payload_len > max_payload_size {
            return Err(WirecallError::FrameCorrupt(format!(
                "payload size {} exceeds maximum {}",
                self.payload_len, max_payload_size
            )));
        }

        Ok(())
    }

    /// Total size of the frame body (meta block + payload).
    #[inline]
    pub fn body_len(&self) -> usize {
        self.meta_len as usize + self.payload_len as usize
    }
}
