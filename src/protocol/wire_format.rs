//! Wire format encoding and decoding.
//!
//! Implements the 6-byte frame header:
//! ```text
//! ┌─────────────┬──────────────┐
//! │ Protocol ID │ Payload size │
//! │ 2 bytes     │ 4 bytes      │
//! │ uint16 BE   │ uint32 BE    │
//! └─────────────┴──────────────┘
//! ```
//!
//! The header is followed by exactly `payload_size` bytes of payload.

use std::ops::Range;

use crate::error::{Result, SessionwireError};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Default maximum payload size (60 KB, fits the default receive buffer).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 60 * 1024;

/// Reserved protocol ID (never resolves to a handler).
pub const RESERVED_PROTOCOL_ID: u16 = 0;

/// Handshake: client announces itself.
pub const CLIENT_HELLO: u16 = 1;

/// Handshake: server assigns the session id.
pub const SERVER_HELLO: u16 = 2;

/// Protocol ids owned by the handshake.
pub const HANDSHAKE_PROTOCOLS: Range<u16> = CLIENT_HELLO..SERVER_HELLO + 1;

/// First protocol id conventionally used by application handlers.
pub const APPLICATION_PROTOCOL_BASE: u16 = 16;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol identifier, resolved against the installed handlers.
    pub protocol_id: u16,
    /// Payload length in bytes (header excluded).
    pub payload_size: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(protocol_id: u16, payload_size: u32) -> Self {
        Self {
            protocol_id,
            payload_size,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use sessionwire::protocol::FrameHeader;
    ///
    /// let bytes = FrameHeader::new(16, 100).encode();
    /// assert_eq!(bytes, [0, 16, 0, 0, 0, 100]);
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
    /// Panics if buffer is smaller than `HEADER_SIZE`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.protocol_id.to_be_bytes());
        buf[2..6].copy_from_slice(&self.payload_size.to_be_bytes());
    }

    /// Decode header from bytes without consuming them.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            protocol_id: u16::from_be_bytes([buf[0], buf[1]]),
            payload_size: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        })
    }

    /// Total on-wire length of the frame (header + payload).
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_size as usize
    }

    /// Validate the header against the receive limits.
    ///
    /// Checks:
    /// - Protocol ID is not 0 (reserved)
    /// - Payload size doesn't exceed max
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.protocol_id == RESERVED_PROTOCOL_ID {
            return Err(SessionwireError::Protocol(
                "Protocol ID 0 is reserved".to_string(),
            ));
        }

        if self.payload_size > max_payload_size {
            return Err(SessionwireError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_size, max_payload_size
            )));
        }

        Ok(())
    }

    /// Check if this header belongs to the handshake.
    #[inline]
    pub fn is_handshake(&self) -> bool {
        HANDSHAKE_PROTOCOLS.contains(&self.protocol_id)
    }
}
