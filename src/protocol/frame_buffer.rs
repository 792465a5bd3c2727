//! Frame buffer for accumulating partial reads.
//!
//! A fixed-capacity byte buffer with a read cursor and a write cursor.
//! The socket reads straight into [`FrameBuffer::write_region`]; the
//! connection then drains complete frames in place and compacts once per
//! read cycle:
//!
//! ```text
//!  0          read_cursor          write_cursor        capacity
//!  │ consumed │ unread (frames...) │ writable region   │
//! ```
//!
//! A header is never handed out before its payload is fully buffered, and
//! a receive that would exceed the writable region is an overflow, never a
//! truncated write.
//!
//! # Example
//!
//! ```
//! use sessionwire::protocol::{build_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::with_capacity(1024);
//! let bytes = build_frame(16, b"hello");
//!
//! // Data arrives in chunks from socket
//! buffer.extend(&bytes[..3]).unwrap();
//! assert!(buffer.next_frame().is_none());
//!
//! buffer.extend(&bytes[3..]).unwrap();
//! let frame = buffer.next_frame().unwrap();
//! assert_eq!(frame.payload(), b"hello");
//! ```

use super::frame::Frame;
use super::wire_format::{FrameHeader, HEADER_SIZE};
use crate::error::{Result, SessionwireError};

/// Default buffer capacity (64 KB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Fixed-capacity receive buffer that turns a byte stream into frames.
pub struct FrameBuffer {
    /// Backing storage, allocated once.
    buffer: Box<[u8]>,
    /// Start of unread bytes.
    read_cursor: usize,
    /// End of received bytes.
    write_cursor: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default 64 KB capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a new frame buffer with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            read_cursor: 0,
            write_cursor: 0,
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of received but not yet consumed bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.write_cursor - self.read_cursor
    }

    /// Check if there are no unread bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that can still be received before compaction.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.write_cursor
    }

    /// Contiguous writable span for the next socket read.
    pub fn write_region(&mut self) -> &mut [u8] {
        &mut self.buffer[self.write_cursor..]
    }

    /// Record that `n` bytes were written into [`write_region`](Self::write_region).
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if `n` exceeds the writable region. The cursors are
    /// left untouched in that case.
    pub fn on_received(&mut self, n: usize) -> Result<()> {
        let available = self.remaining();
        if n > available {
            return Err(SessionwireError::Overflow {
                received: n,
                available,
            });
        }
        self.write_cursor += n;
        Ok(())
    }

    /// Copy `data` into the buffer (for callers that don't read in place).
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        let available = self.remaining();
        if data.len() > available {
            return Err(SessionwireError::Overflow {
                received: data.len(),
                available,
            });
        }
        self.write_region()[..data.len()].copy_from_slice(data);
        self.on_received(data.len())
    }

    /// Check if a full header is buffered.
    #[inline]
    pub fn has_header(&self) -> bool {
        self.len() >= HEADER_SIZE
    }

    /// Read the next header without consuming it.
    pub fn peek_header(&self) -> Option<FrameHeader> {
        FrameHeader::decode(&self.buffer[self.read_cursor..self.write_cursor])
    }

    /// Check if `size` bytes (header + payload) are fully buffered.
    #[inline]
    pub fn has_frame(&self, size: usize) -> bool {
        self.len() >= size
    }

    /// Payload bytes of the frame described by `header`, which must be the
    /// currently peeked header of a fully buffered frame.
    pub fn payload(&self, header: &FrameHeader) -> &[u8] {
        let start = self.read_cursor + HEADER_SIZE;
        &self.buffer[start..self.read_cursor + header.frame_len()]
    }

    /// Advance the read cursor past one dispatched frame of `size` bytes.
    pub fn consume(&mut self, size: usize) {
        debug_assert!(size <= self.len(), "consume past write cursor");
        self.read_cursor += size.min(self.len());
        if self.read_cursor == self.write_cursor {
            self.read_cursor = 0;
            self.write_cursor = 0;
        }
    }

    /// Move unread bytes to the start of the buffer.
    pub fn compact(&mut self) {
        if self.read_cursor == 0 {
            return;
        }
        self.buffer
            .copy_within(self.read_cursor..self.write_cursor, 0);
        self.write_cursor -= self.read_cursor;
        self.read_cursor = 0;
    }

    /// Take the next complete frame out of the buffer (copies the payload).
    pub fn next_frame(&mut self) -> Option<Frame> {
        let header = self.peek_header()?;
        if !self.has_frame(header.frame_len()) {
            return None;
        }
        let frame = Frame::from_parts(header, self.payload(&header));
        self.consume(header.frame_len());
        Some(frame)
    }

    /// Clear the buffer and reset both cursors.
    pub fn clear(&mut self) {
        self.read_cursor = 0;
        self.write_cursor = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
