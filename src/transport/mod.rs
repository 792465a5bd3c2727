//! Transport module - type-erased socket halves and fault classification.
//!
//! A [`Connection`](crate::Connection) owns one read half and one write half.
//! Both are boxed so that TCP sockets and in-memory pipes (tests) share the
//! same driver.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::SessionwireError;

/// Read half of a transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split a connected TCP stream into boxed halves.
///
/// Disables Nagle: the connection already coalesces writes itself.
pub fn split_tcp(stream: TcpStream) -> io::Result<(BoxedReader, BoxedWriter)> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    Ok((Box::new(reader), Box::new(writer)))
}

/// Split any duplex stream into boxed halves.
pub fn split_io<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

/// Map an I/O failure on a live connection into the error taxonomy.
///
/// End-of-stream style errors mean the peer closed; everything else is a
/// transport error whose [`is_graceful`](SessionwireError::is_graceful)
/// tells reset/abort apart from unexpected faults.
pub fn classify(err: io::Error) -> SessionwireError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => SessionwireError::TransportClosed,
        _ => SessionwireError::Transport(err),
    }
}
