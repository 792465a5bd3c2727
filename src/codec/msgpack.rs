//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always encoded with `to_vec_named` (struct-as-map) so that
//! optional fields can be added to a message without breaking older peers.
//!
//! # Example
//!
//! ```
//! use sessionwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Chat {
//!     room: u32,
//!     text: String,
//! }
//!
//! let msg = Chat { room: 7, text: "hello".to_string() };
//! let frame = MsgPackCodec::encode_frame(20, &msg).unwrap();
//! let decoded: Chat = MsgPackCodec::decode(&frame[sessionwire::protocol::HEADER_SIZE..]).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::build_frame;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Encode a value and wrap it in a complete frame, ready to send.
    pub fn encode_frame<T: serde::Serialize>(protocol_id: u16, value: &T) -> Result<Bytes> {
        let payload = Self::encode(value)?;
        Ok(build_frame(protocol_id, &payload))
    }
}
