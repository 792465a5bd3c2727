//! Codec module - payload serialization for typed messages.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` with named fields
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! Handlers that exchange raw bytes skip the codec and use
//! [`build_frame`](crate::protocol::build_frame) directly.
//!
//! # Example
//!
//! ```
//! use sessionwire::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
