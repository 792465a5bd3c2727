//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary framing layer:
//! - 6-byte header encoding/decoding
//! - Fixed-capacity frame buffer for reassembling partial reads
//! - Frame struct and frame building for outbound segments

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::{FrameBuffer, DEFAULT_BUFFER_CAPACITY};
pub use wire_format::{
    FrameHeader, APPLICATION_PROTOCOL_BASE, CLIENT_HELLO, DEFAULT_MAX_PAYLOAD_SIZE,
    HANDSHAKE_PROTOCOLS, HEADER_SIZE, RESERVED_PROTOCOL_ID, SERVER_HELLO,
};
