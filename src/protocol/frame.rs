//! Frame struct and frame building.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use sessionwire::protocol::{build_frame, Frame, FrameHeader, HEADER_SIZE};
//!
//! let bytes = build_frame(16, b"hello");
//! assert_eq!(bytes.len(), HEADER_SIZE + 5);
//!
//! let frame = Frame::from_parts(FrameHeader::new(16, 5), b"hello");
//! assert_eq!(frame.protocol_id(), 16);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{FrameHeader, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a frame from header and raw bytes (copies data).
    pub fn from_parts(header: FrameHeader, payload: &[u8]) -> Self {
        Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the protocol ID.
    #[inline]
    pub fn protocol_id(&self) -> u16 {
        self.header.protocol_id
    }

    /// Encode the frame back into its wire form.
    pub fn to_bytes(&self) -> Bytes {
        build_frame(self.header.protocol_id, &self.payload)
    }
}

/// Build a complete frame (header + payload) as one contiguous buffer.
///
/// The header's `payload_size` is taken from `payload.len()`.
pub fn build_frame(protocol_id: u16, payload: &[u8]) -> Bytes {
    let header = FrameHeader::new(protocol_id, payload.len() as u32);
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frame() {
        let bytes = build_frame(20, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let header = FrameHeader::decode(&bytes).unwrap();
        assert_eq!(header, FrameHeader::new(20, 5));
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let bytes = build_frame(1, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(FrameHeader::decode(&bytes).unwrap().payload_size, 0);
    }

    #[test]
    fn test_frame_to_bytes_matches_build_frame() {
        let frame = Frame::from_parts(FrameHeader::new(33, 4), b"data");
        assert_eq!(frame.to_bytes(), build_frame(33, b"data"));
    }
}
