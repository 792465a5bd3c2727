//! Dispatch context for handlers.
//!
//! Gives a handler the frame's header plus the connection and session it
//! arrived on. Sending goes through the connection's coalescing queue and
//! never blocks on the network.
//!
//! # Example
//!
//! ```ignore
//! fn handle(&self, ctx: &Context<'_>, payload: &[u8]) -> HandlerResult {
//!     ctx.reply(ctx.protocol_id(), payload);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::connection::Connection;
use crate::protocol::FrameHeader;
use crate::session::Session;
use crate::writer::Segment;

/// Context passed to [`Handler::handle`](super::Handler::handle).
///
/// Borrowed for the duration of one dispatch; clone the `Arc`s to keep
/// the connection or session beyond it.
pub struct Context<'a> {
    connection: &'a Arc<Connection>,
    session: &'a Arc<Session>,
    header: FrameHeader,
}

impl<'a> Context<'a> {
    /// Create a context for one frame.
    pub fn new(connection: &'a Arc<Connection>, session: &'a Arc<Session>, header: FrameHeader) -> Self {
        Self {
            connection,
            session,
            header,
        }
    }

    /// The connection the frame arrived on.
    #[inline]
    pub fn connection(&self) -> &'a Arc<Connection> {
        self.connection
    }

    /// The session bound to that connection.
    #[inline]
    pub fn session(&self) -> &'a Arc<Session> {
        self.session
    }

    /// The frame header.
    #[inline]
    pub fn header(&self) -> FrameHeader {
        self.header
    }

    /// The frame's protocol id.
    #[inline]
    pub fn protocol_id(&self) -> u16 {
        self.header.protocol_id
    }

    /// Queue a pre-encoded segment on the originating connection.
    pub fn send(&self, segment: impl Into<Segment>) {
        self.connection.send(segment);
    }

    /// Queue a frame with the given protocol id and payload.
    pub fn reply(&self, protocol_id: u16, payload: &[u8]) {
        self.connection.send(Segment::frame(protocol_id, payload));
    }
}
