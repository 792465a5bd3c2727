//! Outbound segments and batched scatter/gather writes.
//!
//! A [`Connection`](crate::Connection) never writes a segment on its own.
//! Senders append to the pending queue; a flush snapshots the whole queue
//! and hands it to [`write_batch`], which issues one vectored write for all
//! of it:
//!
//! ```text
//! Session::send ─┐
//! Handler reply ─┼─► pending queue ─► flush snapshot ─► write_batch ─► socket
//! Broadcast ─────┘
//! ```
//!
//! Segments are moved into the write operation and only released when it
//! completes.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SessionwireError};
use crate::protocol::build_frame;

/// Default maximum segments per vectored write call.
pub const DEFAULT_MAX_BATCH_SEGMENTS: usize = 64;

/// An owned, immutable byte range queued for writing.
///
/// Usually one encoded frame; cloning is cheap (reference counted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment(Bytes);

impl Segment {
    /// Wrap already encoded bytes.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Encode a frame (header + payload) into a segment.
    pub fn frame(protocol_id: u16, payload: &[u8]) -> Self {
        Self(build_frame(protocol_id, payload))
    }

    /// Segment length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the segment is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap into the underlying bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Segment {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Segment {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Segment {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

/// Write a batch of segments using scatter/gather I/O (write_vectored).
///
/// At most `max_slices` segments go into one `write_vectored` call; the
/// loop continues until every byte is written. Returns the total number of
/// bytes written.
///
/// # Errors
///
/// `TransportClosed` if the writer accepts zero bytes, `Transport` for any
/// other I/O failure.
pub async fn write_batch<W>(writer: &mut W, batch: &[Segment], max_slices: usize) -> Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total_size: usize = batch.iter().map(Segment::len).sum();
    if total_size == 0 {
        return Ok(0);
    }

    let max_slices = max_slices.max(1);
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written, max_slices);
        if slices.is_empty() {
            break;
        }

        let written = writer
            .write_vectored(&slices)
            .await
            .map_err(SessionwireError::Transport)?;
        if written == 0 {
            return Err(SessionwireError::TransportClosed);
        }

        total_written += written;
    }

    writer.flush().await.map_err(SessionwireError::Transport)?;
    Ok(total_written)
}

/// Build IoSlice array for data remaining after `skip_bytes` were written.
fn build_remaining_slices(batch: &[Segment], skip_bytes: usize, max_slices: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len().min(max_slices));
    let mut skipped = 0;

    for segment in batch {
        if slices.len() == max_slices {
            break;
        }

        let start = skipped;
        let end = skipped + segment.len();
        skipped = end;

        if segment.is_empty() || skip_bytes >= end {
            continue;
        }

        let start_in_segment = skip_bytes.saturating_sub(start);
        slices.push(IoSlice::new(&segment.as_bytes()[start_in_segment..]));
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn segments(parts: &[&'static [u8]]) -> Vec<Segment> {
        parts.iter().map(|p| Segment::from(*p)).collect()
    }

    /// Writer that accepts at most `limit` bytes per call.
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
        calls: usize,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            self.calls += 1;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_segment_frame() {
        let segment = Segment::frame(16, b"hello");
        assert_eq!(segment.len(), crate::protocol::HEADER_SIZE + 5);
        assert!(!segment.is_empty());
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = segments(&[b"abc", b"defg"]);
        let slices = build_remaining_slices(&batch, 0, 64);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_segment() {
        let batch = segments(&[b"abc", b"defg"]);
        let slices = build_remaining_slices(&batch, 4, 64);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"efg");
    }

    #[test]
    fn test_build_remaining_slices_respects_limit() {
        let batch = segments(&[b"a", b"b", b"c", b"d"]);
        let slices = build_remaining_slices(&batch, 1, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"b");
        assert_eq!(&*slices[1], b"c");
    }

    #[test]
    fn test_build_remaining_slices_skips_empty() {
        let batch = segments(&[b"", b"xy", b""]);
        let slices = build_remaining_slices(&batch, 0, 64);
        assert_eq!(slices.len(), 1);
    }

    #[tokio::test]
    async fn test_write_batch_preserves_order() {
        let mut buf = Cursor::new(Vec::new());
        let batch = segments(&[b"one-", b"two-", b"three"]);

        let written = write_batch(&mut buf, &batch, 64).await.unwrap();

        assert_eq!(written, 13);
        assert_eq!(buf.into_inner(), b"one-two-three");
    }

    #[tokio::test]
    async fn test_write_batch_partial_writes() {
        let mut writer = Trickle {
            out: Vec::new(),
            limit: 3,
            calls: 0,
        };
        let batch = segments(&[b"hello ", b"vectored ", b"world"]);

        write_batch(&mut writer, &batch, 64).await.unwrap();

        assert_eq!(writer.out, b"hello vectored world");
        assert!(writer.calls > 1);
    }

    #[tokio::test]
    async fn test_write_batch_zero_write_is_closed() {
        let mut writer = Trickle {
            out: Vec::new(),
            limit: 0,
            calls: 0,
        };
        let batch = segments(&[b"data"]);

        let result = write_batch(&mut writer, &batch, 64).await;
        assert!(matches!(result, Err(SessionwireError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_write_batch_empty() {
        let mut buf = Cursor::new(Vec::new());
        assert_eq!(write_batch(&mut buf, &[], 64).await.unwrap(), 0);
    }
}
