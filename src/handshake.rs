//! Handshake - one-shot identity negotiation per connection.
//!
//! ```text
//! Client                                  Server
//!   │ ── ClientHello {} ──────────────────► │  allocate id, register session
//!   │ ◄───────────────── ServerHello {id} ─ │  swap to application handlers
//!   │  assign id, swap to application       │
//! ```
//!
//! States move `Connected → Identified → Application`. The handshake is
//! installed as the only handler of its connection; on completion it is
//! removed and the application set installed in one atomic swap, so no
//! frame is ever routed to both.

use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::connection::Connection;
use crate::error::{Result, SessionwireError};
use crate::handler::{Context, Handler, HandlerKind, HandlerResult};
use crate::listener::ServerContext;
use crate::protocol::{CLIENT_HELLO, HANDSHAKE_PROTOCOLS, SERVER_HELLO};
use crate::session::{Session, SessionId};

/// Kind tag of the handshake handler.
pub const HANDSHAKE_KIND: HandlerKind = HandlerKind::new("handshake");

/// First message of a connection, sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    /// Identity the client would like to resume. Never honored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
}

/// Server reply carrying the assigned session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    pub session_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Transport is up, no identity yet.
    Connected,
    /// Session id assigned, handler swap pending.
    Identified,
    /// Application handlers installed.
    Application,
}

/// Which side of the exchange a handshake runs.
pub enum HandshakeRole {
    Client,
    Server(Arc<ServerContext>),
}

/// Handshake state machine for one connection.
pub struct Handshake {
    role: HandshakeRole,
    state: Mutex<HandshakeState>,
    application: Vec<Arc<dyn Handler>>,
    /// Server side: owns the accepted session until the registry does.
    pending_session: Mutex<Option<Arc<Session>>>,
}

impl Handshake {
    /// Client side: sends `ClientHello` on start, installs `application`
    /// once the server assigns an id.
    pub fn client(application: Vec<Arc<dyn Handler>>) -> Arc<Self> {
        Self::new(HandshakeRole::Client, application)
    }

    /// Server side: answers `ClientHello` with an id from `context` and
    /// registers the session there.
    pub fn server(context: Arc<ServerContext>, application: Vec<Arc<dyn Handler>>) -> Arc<Self> {
        Self::new(HandshakeRole::Server(context), application)
    }

    fn new(role: HandshakeRole, application: Vec<Arc<dyn Handler>>) -> Arc<Self> {
        Arc::new(Self {
            role,
            state: Mutex::new(HandshakeState::Connected),
            application,
            pending_session: Mutex::new(None),
        })
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.lock()
    }

    pub fn is_client(&self) -> bool {
        matches!(self.role, HandshakeRole::Client)
    }

    /// Install on `connection` and, for clients, send the hello.
    ///
    /// A server handshake keeps the connection's session alive until the
    /// session is registered; the connection itself only holds it weakly.
    pub(crate) fn start(self: &Arc<Self>, connection: &Arc<Connection>) -> Result<()> {
        connection.install_handler(Arc::clone(self) as Arc<dyn Handler>);

        if self.is_client() {
            let hello = MsgPackCodec::encode_frame(CLIENT_HELLO, &ClientHello::default())?;
            connection.send(hello);
            tracing::debug!("Connection {} sent ClientHello", connection.id());
        } else {
            *self.pending_session.lock() = connection.session();
        }
        Ok(())
    }

    fn on_client_hello(&self, ctx: &Context<'_>, context: &ServerContext, payload: &[u8]) -> HandlerResult {
        let mut state = self.state.lock();
        if *state != HandshakeState::Connected {
            return Err(SessionwireError::Handshake(format!(
                "ClientHello received in state {:?}",
                *state
            )));
        }

        let hello: ClientHello = if payload.is_empty() {
            ClientHello::default()
        } else {
            MsgPackCodec::decode(payload)?
        };
        if let Some(requested) = hello.session_id {
            tracing::warn!(
                "Connection {} asked to resume session {}, issuing a fresh identity",
                ctx.connection().id(),
                requested
            );
        }

        let session = ctx.session();
        let id = match session.id() {
            Some(id) => id,
            None => {
                let id = context.ids.allocate();
                session.assign_id(id)?;
                id
            }
        };
        *state = HandshakeState::Identified;
        context.registry.add(Arc::clone(session));
        self.release_session();

        let reply = MsgPackCodec::encode_frame(SERVER_HELLO, &ServerHello { session_id: id.get() })?;
        self.elevate(ctx.connection());
        ctx.send(reply);
        *state = HandshakeState::Application;

        tracing::info!(
            "Connection {} identified as session {}",
            ctx.connection().id(),
            id
        );
        Ok(())
    }

    fn on_server_hello(&self, ctx: &Context<'_>, payload: &[u8]) -> HandlerResult {
        let mut state = self.state.lock();
        if *state != HandshakeState::Connected {
            return Err(SessionwireError::Handshake(format!(
                "ServerHello received in state {:?}",
                *state
            )));
        }

        let hello: ServerHello = MsgPackCodec::decode(payload)?;
        let id = SessionId::new(hello.session_id).ok_or_else(|| {
            SessionwireError::Handshake("server assigned reserved session id 0".to_string())
        })?;

        *state = HandshakeState::Identified;

        // Application handlers are in place before `identified()` wakes.
        self.elevate(ctx.connection());
        ctx.session().assign_id(id)?;
        *state = HandshakeState::Application;

        tracing::info!(
            "Connection {} identified by server as session {}",
            ctx.connection().id(),
            id
        );
        Ok(())
    }

    /// Drop the session held since `start`.
    pub(crate) fn release_session(&self) {
        self.pending_session.lock().take();
    }

    /// Swap the handshake out for the application handlers.
    fn elevate(&self, connection: &Arc<Connection>) {
        connection.handlers().replace(HANDSHAKE_KIND, &self.application);
        connection.clear_handshake();
    }
}

impl Handler for Handshake {
    fn kind(&self) -> HandlerKind {
        HANDSHAKE_KIND
    }

    fn protocols(&self) -> Range<u16> {
        HANDSHAKE_PROTOCOLS
    }

    fn handle(&self, ctx: &Context<'_>, payload: &[u8]) -> HandlerResult {
        match (&self.role, ctx.protocol_id()) {
            (HandshakeRole::Server(context), CLIENT_HELLO) => self.on_client_hello(ctx, context, payload),
            (HandshakeRole::Client, SERVER_HELLO) => self.on_server_hello(ctx, payload),
            (_, protocol_id) => Err(SessionwireError::Handshake(format!(
                "unexpected protocol {} for {} handshake",
                protocol_id,
                if self.is_client() { "client" } else { "server" }
            ))),
        }
    }
}
