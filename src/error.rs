//! Error types for wirecall.

use thiserror::Error;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum WirecallError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame on the wire (bad magic, oversized lengths, garbage
    /// meta block). Fatal to the connection.
    #[error("corrupt frame: {0}")]
    FrameCorrupt(String),

    /// The connection was closed (peer hangup, I/O failure, or local
    /// shutdown). Fails every call pending on that connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// No handler registered for the requested service/method pair.
    #[error("unknown method: {service}.{method}")]
    UnknownMethod {
        /// Service name from the request frame.
        service: String,
        /// Method name from the request frame.
        method: String,
    },

    /// The peer reported a per-call failure (carried in a failed response
    /// frame). The text is whatever the remote handler produced.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The call was canceled locally before a response arrived.
    #[error("call canceled")]
    Canceled,

    /// Write queue stayed full past the configured timeout.
    #[error("backpressure timeout")]
    BackpressureTimeout,

    /// MessagePack serialization error.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Result type alias using WirecallError.
pub type Result<T> = std::result::Result<T, WirecallError>;
