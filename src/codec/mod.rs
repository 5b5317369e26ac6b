//! Codec module - serialization/deserialization for payloads.
//!
//! The transport treats payloads as opaque bytes; these codecs are the
//! convenience layer the typed call path and typed handlers use:
//!
//! - [`RawCodec`] - Pass-through for raw bytes (zero-copy)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (struct-as-map)
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather
//! than trait objects. This allows for compile-time codec selection and
//! enables zero-copy optimizations.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{MsgPackCodec, RawCodec};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let raw = RawCodec::serialize(b"binary data");
//! assert_eq!(RawCodec::deserialize(&raw), b"binary data");
//! ```

mod msgpack;
mod raw;

pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;
