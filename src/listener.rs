//! Listener - accepts TCP transports and hands them to the core.
//!
//! A configured number of acceptor tasks share one socket. For each
//! accepted stream the listener builds a [`Connection`], a [`Session`] from
//! the caller's factory, runs the caller's accept callback (typically to
//! require a server [`Handshake`]) and then completes the accept.
//!
//! Server-wide state lives in an explicit [`ServerContext`]:
//!
//! ```ignore
//! init_logging(&config.log);
//! let context = ServerContext::new(config.connection.clone());
//! let listener = Listener::bind(ListenerConfig::for_server(&context, config.listener, vec![chat()])).await?;
//! // ...
//! listener.stop();
//! context.shutdown();
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::config::{ConnectionConfig, ListenerSettings};
use crate::connection::Connection;
use crate::error::{Result, SessionwireError};
use crate::handler::Handler;
use crate::handshake::Handshake;
use crate::session::{Session, SessionIdAllocator, SessionRegistry};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Builds the session for a freshly accepted connection.
pub type SessionFactory = Arc<dyn Fn() -> Arc<Session> + Send + Sync>;

/// Runs once per accepted connection, before it is established.
pub type AcceptCallback = Arc<dyn Fn(&Arc<Connection>, &Arc<Session>) + Send + Sync>;

/// Shared server state: registered sessions and the id allocator.
pub struct ServerContext {
    pub registry: SessionRegistry,
    pub ids: SessionIdAllocator,
    pub config: ConnectionConfig,
}

impl ServerContext {
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: SessionRegistry::new(),
            ids: SessionIdAllocator::new(),
            config,
        })
    }

    /// Disconnect every registered session. Returns how many were connected.
    pub fn shutdown(&self) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter_map(|session| session.connection())
            .filter(|connection| connection.disconnect())
            .count()
    }
}

/// How a [`Listener`] binds and what it does with each connection.
pub struct ListenerConfig {
    pub bind: String,
    pub accept_count: usize,
    pub connection: ConnectionConfig,
    session_factory: SessionFactory,
    on_accept: AcceptCallback,
}

impl ListenerConfig {
    pub fn new(settings: ListenerSettings, connection: ConnectionConfig) -> Self {
        Self {
            bind: settings.bind,
            accept_count: settings.accept_count,
            connection,
            session_factory: Arc::new(Session::new),
            on_accept: Arc::new(|_: &Arc<Connection>, _: &Arc<Session>| {}),
        }
    }

    /// Listener wired to `context`: every connection runs the server
    /// handshake and is elevated to `application` once identified.
    pub fn for_server(
        context: &Arc<ServerContext>,
        settings: ListenerSettings,
        application: Vec<Arc<dyn Handler>>,
    ) -> Self {
        let server = Arc::clone(context);
        Self::new(settings, context.config.clone()).on_accept(move |connection, _session| {
            connection.require_handshake(Handshake::server(Arc::clone(&server), application.clone()));
        })
    }

    /// Set the session factory.
    pub fn session_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<Session> + Send + Sync + 'static,
    {
        self.session_factory = Arc::new(factory);
        self
    }

    /// Set the accept callback.
    ///
    /// Connections link to their session weakly. Without a server
    /// handshake (which holds the session until it is registered) the
    /// callback must keep the session alive itself.
    pub fn on_accept<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<Connection>, &Arc<Session>) + Send + Sync + 'static,
    {
        self.on_accept = Arc::new(callback);
        self
    }

    fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        if self.accept_count == 0 {
            return Err(SessionwireError::Config(
                "accept_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

struct Acceptor {
    connection: ConnectionConfig,
    session_factory: SessionFactory,
    on_accept: AcceptCallback,
    accepted: AtomicU64,
}

impl Acceptor {
    async fn run(self: Arc<Self>, listener: Arc<TcpListener>, index: usize) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Acceptor {} accepted {}", index, peer);
                    self.hand_off(stream);
                }
                Err(e) => {
                    tracing::warn!("Acceptor {} accept failed: {}", index, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn hand_off(&self, stream: TcpStream) {
        let connection = match Connection::from_stream(stream, self.connection.clone()) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Failed to set up accepted stream: {}", e);
                return;
            }
        };

        let session = (self.session_factory)();
        connection.attach_session(&session);
        (self.on_accept)(&connection, &session);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        connection.accept_complete();
    }
}

/// A bound TCP listener with its acceptor tasks.
pub struct Listener {
    local_addr: SocketAddr,
    acceptor: Arc<Acceptor>,
    tasks: Vec<JoinHandle<()>>,
}

impl Listener {
    /// Bind and start `accept_count` acceptor tasks.
    pub async fn bind(config: ListenerConfig) -> Result<Self> {
        config.validate()?;

        let listener = Arc::new(TcpListener::bind(&config.bind).await?);
        let local_addr = listener.local_addr()?;

        let acceptor = Arc::new(Acceptor {
            connection: config.connection,
            session_factory: config.session_factory,
            on_accept: config.on_accept,
            accepted: AtomicU64::new(0),
        });

        let tasks = (0..config.accept_count)
            .map(|index| tokio::spawn(Arc::clone(&acceptor).run(Arc::clone(&listener), index)))
            .collect();

        tracing::info!(
            "Listening on {} with {} acceptors",
            local_addr,
            config.accept_count
        );

        Ok(Self {
            local_addr,
            acceptor,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.acceptor.accepted.load(Ordering::Relaxed)
    }

    /// Stop accepting. Established connections are unaffected.
    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("Listener on {} stopped", self.local_addr);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn local() -> ListenerSettings {
        ListenerSettings {
            bind: "127.0.0.1:0".to_string(),
            accept_count: 2,
        }
    }

    #[tokio::test]
    async fn test_zero_acceptors_rejected() {
        let settings = ListenerSettings {
            accept_count: 0,
            ..local()
        };
        let result = Listener::bind(ListenerConfig::new(settings, ConnectionConfig::default())).await;
        assert!(matches!(result, Err(SessionwireError::Config(_))));
    }

    #[tokio::test]
    async fn test_accept_runs_callback_with_attached_session() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let config = ListenerConfig::new(local(), ConnectionConfig::default()).on_accept(
            move |connection, session| {
                let _ = tx.send((connection.clone(), session.clone()));
            },
        );
        let listener = Listener::bind(config).await.unwrap();

        let _stream = TcpStream::connect(listener.local_addr()).await.unwrap();
        let (connection, session) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !connection.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(Arc::ptr_eq(&session.connection().unwrap(), &connection));
        assert!(connection.peer_addr().is_some());
        assert_eq!(listener.accepted(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_accepted_session_survives_until_client_hello() {
        let context = ServerContext::new(ConnectionConfig::default());
        let listener = Listener::bind(ListenerConfig::for_server(&context, local(), Vec::new()))
            .await
            .unwrap();

        let mut stream = TcpStream::connect(listener.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(context.registry.is_empty());

        stream.write_all(&build_frame(crate::protocol::CLIENT_HELLO, b"")).await.unwrap();

        let mut reply = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut reply))
            .await
            .unwrap()
            .unwrap();
        let header = crate::protocol::FrameHeader::decode(&reply[..n]).unwrap();
        assert_eq!(header.protocol_id, crate::protocol::SERVER_HELLO);

        let session = context.registry.snapshot().pop().unwrap();
        assert!(session.id().is_some());
        assert!(session.connection().unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_server_context_handshake_and_shutdown() {
        let context = ServerContext::new(ConnectionConfig::default());
        let listener = Listener::bind(ListenerConfig::for_server(&context, local(), Vec::new()))
            .await
            .unwrap();

        let mut stream = TcpStream::connect(listener.local_addr()).await.unwrap();
        stream.write_all(&build_frame(crate::protocol::CLIENT_HELLO, b"")).await.unwrap();

        let mut reply = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0);
        assert_eq!(context.registry.len(), 1);

        listener.stop();
        assert_eq!(context.shutdown(), 1);

        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
