//! Connection - the live transport serving one session.
//!
//! A connection owns its socket halves, its handler list and its outbound
//! queue. Reads and writes are tasks spawned on the runtime handle captured
//! at construction; each task owns an `Arc<Connection>` plus its buffers for
//! as long as the operation is outstanding, so a connection is never dropped
//! mid-flight.
//!
//! ```text
//! ┌──────────── read task ────────────┐      ┌──────── write task ────────┐
//! │ socket ─► FrameBuffer ─► resolve  │      │ pending snapshot           │
//! │            ▲            ─► handle │      │   ─► write_vectored        │
//! │            └── compact ◄──────────┘      │   ─► re-flush if non-empty │
//! └───────────────────────────────────┘      └────────────────────────────┘
//! ```
//!
//! At most one write task exists at a time (`send_pending`). Senders only
//! append to the queue under a short lock and never wait on the network.
//! Every fault ends in [`Connection::disconnect`], which runs its teardown
//! exactly once.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::config::ConnectionConfig;
use crate::error::{Result, SessionwireError};
use crate::handler::{Context, Handler, HandlerKind, HandlerRegistry};
use crate::handshake::Handshake;
use crate::protocol::FrameBuffer;
use crate::session::Session;
use crate::transport::{classify, split_tcp, BoxedReader, BoxedWriter};
use crate::writer::{write_batch, Segment};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A framed, full-duplex transport with a coalescing writer.
pub struct Connection {
    id: u64,
    handle: Handle,
    config: ConnectionConfig,
    connected: AtomicBool,
    /// Set while a flush is in flight.
    send_pending: AtomicBool,
    pending: Mutex<Vec<Segment>>,
    /// Read half until the read task takes it.
    reader: Mutex<Option<BoxedReader>>,
    /// Write half while no write is in flight.
    writer: Mutex<Option<BoxedWriter>>,
    handlers: HandlerRegistry,
    handshake: Mutex<Option<Arc<Handshake>>>,
    /// Non-owning back-reference; the session owns us.
    session: RwLock<Weak<Session>>,
    peer: Mutex<Option<SocketAddr>>,
    shutdown: Notify,
    write_ops: AtomicU64,
}

impl Connection {
    /// Create an unconnected connection for an outbound [`connect`](Self::connect).
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        Self::build(Handle::current(), config, None, None, None)
    }

    /// Wrap an already established transport.
    ///
    /// The connection stays idle until [`accept_complete`](Self::accept_complete).
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn from_io(reader: BoxedReader, writer: BoxedWriter, config: ConnectionConfig) -> Arc<Self> {
        Self::build(Handle::current(), config, Some(reader), Some(writer), None)
    }

    /// Wrap an accepted TCP stream.
    pub fn from_stream(stream: TcpStream, config: ConnectionConfig) -> Result<Arc<Self>> {
        let peer = stream.peer_addr().ok();
        let (reader, writer) = split_tcp(stream)?;
        Ok(Self::build(
            Handle::current(),
            config,
            Some(reader),
            Some(writer),
            peer,
        ))
    }

    fn build(
        handle: Handle,
        config: ConnectionConfig,
        reader: Option<BoxedReader>,
        writer: Option<BoxedWriter>,
        peer: Option<SocketAddr>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            handle,
            config,
            connected: AtomicBool::new(false),
            send_pending: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            handlers: HandlerRegistry::new(),
            handshake: Mutex::new(None),
            session: RwLock::new(Weak::new()),
            peer: Mutex::new(peer),
            shutdown: Notify::new(),
            write_ops: AtomicU64::new(0),
        })
    }

    /// Process-unique connection id, for logs.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Remote address, when the transport has one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer.lock()
    }

    /// Number of batched writes issued so far.
    pub fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The handler list frames are resolved against.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Append a handler. Installing a kind twice is a no-op.
    pub fn install_handler(&self, handler: Arc<dyn Handler>) -> bool {
        self.handlers.install(handler)
    }

    /// Remove the handler of the given kind.
    pub fn uninstall_handler(&self, kind: HandlerKind) -> bool {
        self.handlers.uninstall(kind).is_some()
    }

    /// Run `handshake` when the connection is established.
    pub fn require_handshake(&self, handshake: Arc<Handshake>) {
        *self.handshake.lock() = Some(handshake);
    }

    /// The handshake still in progress, if any.
    pub fn handshake(&self) -> Option<Arc<Handshake>> {
        self.handshake.lock().clone()
    }

    pub(crate) fn clear_handshake(&self) {
        self.handshake.lock().take();
    }

    /// The session this connection serves, if it is still alive.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().upgrade()
    }

    pub(crate) fn link_session(&self, session: &Arc<Session>) {
        *self.session.write() = Arc::downgrade(session);
    }

    pub(crate) fn unlink_session(&self, session: &Arc<Session>) {
        let mut slot = self.session.write();
        if std::ptr::eq(slot.as_ptr(), Arc::as_ptr(session)) {
            *slot = Weak::new();
        }
    }

    /// Bind this connection to `session`.
    ///
    /// A previously linked session is detached from us first. If the
    /// transport is already connected the session attaches immediately,
    /// otherwise it attaches once the connection is established.
    pub fn attach_session(self: &Arc<Self>, session: &Arc<Session>) {
        if let Some(previous) = self.session() {
            if !Arc::ptr_eq(&previous, session) {
                previous.detach_connection(self);
            }
        }

        self.link_session(session);
        if self.is_connected() {
            session.attach(Arc::clone(self));
        }
    }

    /// Open an outbound TCP transport and establish the connection.
    ///
    /// Runs the required handshake, if any, once connected.
    pub async fn connect<A: ToSocketAddrs>(self: &Arc<Self>, addr: A) -> Result<()> {
        if self.is_connected() {
            return Err(SessionwireError::Protocol(format!(
                "connection {} is already connected",
                self.id
            )));
        }

        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr().ok();
        let (reader, writer) = split_tcp(stream)?;

        *self.reader.lock() = Some(reader);
        *self.writer.lock() = Some(writer);
        *self.peer.lock() = peer;

        if !self.mark_connected() {
            return Err(SessionwireError::Protocol(format!(
                "connection {} was connected concurrently",
                self.id
            )));
        }

        tracing::info!("Connection {} connected to {:?}", self.id, peer);
        self.establish();
        Ok(())
    }

    /// Establish a connection whose transport was accepted.
    ///
    /// Attaches the linked session, runs the required handshake and arms
    /// the first read. Calling it twice is a no-op.
    pub fn accept_complete(self: &Arc<Self>) {
        if !self.mark_connected() {
            tracing::debug!("Connection {} already established", self.id);
            return;
        }

        tracing::info!("Connection {} accepted from {:?}", self.id, self.peer_addr());
        self.establish();
    }

    fn mark_connected(&self) -> bool {
        self.connected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn establish(self: &Arc<Self>) {
        if let Some(session) = self.session() {
            session.attach(Arc::clone(self));
        }

        if let Err(e) = self.process_handshake() {
            self.fail(e);
            return;
        }

        self.start();
    }

    fn process_handshake(self: &Arc<Self>) -> Result<()> {
        let handshake = self.handshake.lock().clone();
        match handshake {
            Some(handshake) => handshake.start(self),
            None => Ok(()),
        }
    }

    /// Arm the read loop. No-op if not connected or already reading.
    pub fn start(self: &Arc<Self>) {
        if !self.is_connected() {
            return;
        }

        let Some(reader) = self.reader.lock().take() else {
            return;
        };

        let this = Arc::clone(self);
        self.handle.spawn(async move {
            this.read_loop(reader).await;
        });
    }

    /// Queue a segment for writing.
    ///
    /// Never blocks on the network. If no write is in flight this triggers
    /// a flush; otherwise the segment joins the next batch.
    pub fn send(self: &Arc<Self>, segment: impl Into<Segment>) {
        self.pending.lock().push(segment.into());

        if self.try_claim_flush() {
            self.flush();
        }
    }

    fn try_claim_flush(&self) -> bool {
        self.send_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Write the whole pending queue as one batch. Caller holds `send_pending`.
    fn flush(self: &Arc<Self>) {
        if !self.is_connected() {
            self.pending.lock().clear();
            self.send_pending.store(false, Ordering::Release);
            return;
        }

        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            self.send_pending.store(false, Ordering::Release);
            // A sender may have queued after the snapshot and lost the claim.
            if !self.pending.lock().is_empty() && self.try_claim_flush() {
                self.flush();
            }
            return;
        }

        let Some(mut writer) = self.writer.lock().take() else {
            self.send_pending.store(false, Ordering::Release);
            return;
        };

        self.write_ops.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Connection {} flushing {} segments ({} bytes)",
            self.id,
            batch.len(),
            batch.iter().map(Segment::len).sum::<usize>()
        );

        let this = Arc::clone(self);
        let max_slices = self.config.max_batch_segments;
        self.handle.spawn(async move {
            let result = write_batch(&mut writer, &batch, max_slices).await;
            drop(batch);
            this.on_write_complete(writer, result);
        });
    }

    fn on_write_complete(self: &Arc<Self>, writer: BoxedWriter, result: Result<usize>) {
        if let Err(e) = result {
            drop(writer);
            self.fail(e);
            self.send_pending.store(false, Ordering::Release);
            return;
        }

        if self.is_connected() {
            *self.writer.lock() = Some(writer);
            // Disconnect may have run before the writer was restored.
            if !self.is_connected() {
                self.release_writer();
            }
        } else {
            self.shutdown_writer(writer);
        }

        self.send_pending.store(false, Ordering::Release);
        if !self.pending.lock().is_empty() && self.try_claim_flush() {
            self.flush();
        }
    }

    async fn read_loop(self: Arc<Self>, mut reader: BoxedReader) {
        let mut buffer = FrameBuffer::with_capacity(self.config.recv_buffer_capacity);

        let result = loop {
            let shutdown = self.shutdown.notified();
            if !self.is_connected() {
                break Ok(());
            }

            let region = buffer.write_region();
            if region.is_empty() {
                break Err(SessionwireError::Overflow {
                    received: 0,
                    available: 0,
                });
            }

            let read = tokio::select! {
                read = reader.read(region) => read,
                _ = shutdown => break Ok(()),
            };

            if let Err(e) = self.on_read_complete(read, &mut buffer) {
                break Err(e);
            }
        };

        if let Err(e) = result {
            self.fail(e);
        }
        tracing::trace!("Connection {} read loop finished", self.id);
    }

    fn on_read_complete(self: &Arc<Self>, read: std::io::Result<usize>, buffer: &mut FrameBuffer) -> Result<()> {
        let n = match read {
            Ok(0) => return Err(SessionwireError::TransportClosed),
            Ok(n) => n,
            Err(e) => return Err(classify(e)),
        };

        buffer.on_received(n)?;
        self.drain(buffer)?;
        buffer.compact();
        Ok(())
    }

    /// Dispatch every complete frame in the buffer, in order.
    fn drain(self: &Arc<Self>, buffer: &mut FrameBuffer) -> Result<()> {
        while let Some(header) = buffer.peek_header() {
            header.validate(self.config.max_payload_size)?;

            let frame_len = header.frame_len();
            if frame_len > buffer.capacity() {
                return Err(SessionwireError::Protocol(format!(
                    "frame of {} bytes exceeds receive buffer of {}",
                    frame_len,
                    buffer.capacity()
                )));
            }
            if !buffer.has_frame(frame_len) {
                break;
            }

            let handler = self
                .handlers
                .resolve(header.protocol_id)
                .ok_or(SessionwireError::UnknownProtocol(header.protocol_id))?;
            let session = self.session().ok_or(SessionwireError::SessionReleased)?;

            tracing::debug!(
                "Connection {} dispatching protocol {} ({} bytes) to {}",
                self.id,
                header.protocol_id,
                header.payload_size,
                handler.kind()
            );

            let ctx = Context::new(self, &session, header);
            handler.handle(&ctx, buffer.payload(&header))?;
            buffer.consume(frame_len);

            if !self.is_connected() {
                break;
            }
        }
        Ok(())
    }

    /// Log a fault and tear the connection down.
    fn fail(self: &Arc<Self>, err: SessionwireError) {
        if err.is_graceful() {
            tracing::debug!("Connection {} closed by peer: {}", self.id, err);
        } else if err.is_protocol() {
            tracing::warn!("Connection {} protocol error: {}", self.id, err);
        } else {
            tracing::error!("Connection {} failed: {}", self.id, err);
        }
        self.disconnect();
    }

    /// Tear the connection down.
    ///
    /// Idempotent: only the first call (from any thread, racing any fault)
    /// detaches the session and releases the transport; later calls return
    /// `false`. An in-flight write completes before its writer is closed.
    pub fn disconnect(self: &Arc<Self>) -> bool {
        if self
            .connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        tracing::info!("Connection {} disconnected", self.id);

        if let Some(session) = self.session() {
            session.detach_connection(self);
        }

        self.shutdown.notify_waiters();
        self.reader.lock().take();
        self.release_writer();
        self.pending.lock().clear();
        let handshake = self.handshake.lock().take();
        if let Some(handshake) = handshake {
            handshake.release_session();
        }
        true
    }

    /// Wait until the connection is disconnected.
    pub async fn closed(&self) {
        loop {
            let shutdown = self.shutdown.notified();
            if !self.is_connected() {
                return;
            }
            shutdown.await;
        }
    }

    fn release_writer(&self) {
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            self.shutdown_writer(writer);
        }
    }

    fn shutdown_writer(&self, mut writer: BoxedWriter) {
        let id = self.id;
        self.handle.spawn(async move {
            if let Err(e) = writer.shutdown().await {
                tracing::trace!("Connection {} writer shutdown: {}", id, e);
            }
        });
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("peer", &self.peer_addr())
            .finish()
    }
}
