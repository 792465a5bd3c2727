//! Client builder and connected client.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring application
//! handlers and building the client. [`ClientBuilder::connect`] manages the
//! lifecycle:
//! 1. Create the session and connection
//! 2. Require the client handshake
//! 3. Connect the TCP transport and send `ClientHello`
//! 4. Install the application handlers once `ServerHello` arrives
//!
//! # Example
//!
//! ```ignore
//! use sessionwire::{ClientBuilder, FnHandler, HandlerKind, Segment};
//!
//! #[tokio::main]
//! async fn main() -> sessionwire::Result<()> {
//!     let client = ClientBuilder::new()
//!         .handler(FnHandler::shared(HandlerKind::new("chat"), 16..32, |_ctx, payload| {
//!             println!("{}", String::from_utf8_lossy(payload));
//!             Ok(())
//!         }))
//!         .connect("127.0.0.1:7000")
//!         .await?;
//!
//!     client.identified().await;
//!     client.send(Segment::frame(16, b"hello"));
//!     client.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::net::ToSocketAddrs;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::handler::Handler;
use crate::handshake::Handshake;
use crate::session::{Session, SessionId, SessionObserver};
use crate::writer::Segment;

/// Builder for configuring and connecting a client.
#[derive(Default)]
pub struct ClientBuilder {
    handlers: Vec<Arc<dyn Handler>>,
    config: ConnectionConfig,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an application handler, installed after the handshake.
    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Set the connection configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Report session lifecycle events to `observer`.
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Connect to `addr` and start the handshake.
    ///
    /// Returns as soon as the transport is up; await
    /// [`Client::identified`] for the session id.
    pub async fn connect<A: ToSocketAddrs>(self, addr: A) -> Result<Client> {
        self.config.validate()?;

        let session = match self.observer {
            Some(observer) => Session::with_observer(observer),
            None => Session::new(),
        };

        let connection = Connection::new(self.config);
        connection.attach_session(&session);
        connection.require_handshake(Handshake::client(self.handlers));
        connection.connect(addr).await?;

        Ok(Client {
            session,
            connection,
        })
    }
}

/// A connected client: one session over one connection.
pub struct Client {
    session: Arc<Session>,
    connection: Arc<Connection>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Wait for the server to assign the session id.
    pub async fn identified(&self) -> SessionId {
        self.session.identified().await
    }

    /// Queue a segment. Returns `false` once the connection is gone.
    pub fn send(&self, segment: impl Into<Segment>) -> bool {
        self.session.send(segment)
    }

    /// Close the connection.
    pub fn disconnect(&self) -> bool {
        self.connection.disconnect()
    }

    /// Wait until the connection closes.
    pub async fn wait_for_shutdown(&self) {
        self.connection.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionwireError;
    use crate::handler::{FnHandler, HandlerKind};

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder()
            .handler(FnHandler::shared(HandlerKind::new("a"), 16..32, |_, _| Ok(())))
            .handler(FnHandler::shared(HandlerKind::new("b"), 32..48, |_, _| Ok(())))
            .config(ConnectionConfig {
                max_batch_segments: 8,
                ..ConnectionConfig::default()
            });

        assert_eq!(builder.handlers.len(), 2);
        assert_eq!(builder.config.max_batch_segments, 8);
        assert!(builder.observer.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_connect() {
        let config = ConnectionConfig {
            max_batch_segments: 0,
            ..ConnectionConfig::default()
        };
        let result = ClientBuilder::new().config(config).connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(SessionwireError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = ClientBuilder::new().connect(addr).await;
        assert!(matches!(result, Err(SessionwireError::Io(_))));
    }
}
