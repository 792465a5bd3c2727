//! Session - a stable logical endpoint over a replaceable connection.
//!
//! A session owns its current [`Connection`] strongly while attached; the
//! connection only keeps a weak back-reference. Transport loss detaches the
//! connection but never drops the session: that is up to the application
//! (see [`SessionRegistry::remove`](super::SessionRegistry::remove)).
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new();
//! connection.attach_session(&session);
//! connection.connect(addr).await?;
//!
//! let id = session.identified().await;
//! session.send(Segment::frame(APPLICATION_PROTOCOL_BASE, b"hello"));
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tokio::sync::Notify;

use super::SessionId;
use crate::connection::Connection;
use crate::error::{Result, SessionwireError};
use crate::writer::Segment;

/// Application hooks for session lifecycle events.
///
/// Callbacks run on whichever thread caused the event, never while the
/// session's own lock is held.
pub trait SessionObserver: Send + Sync + 'static {
    /// A connection became the session's transport.
    fn on_attached(&self, _session: &Arc<Session>, _connection: &Arc<Connection>) {}

    /// The session's transport was released.
    fn on_detached(&self, _session: &Arc<Session>) {}

    /// The handshake assigned the session's identity.
    fn on_identified(&self, _session: &Arc<Session>, _id: SessionId) {}
}

/// A logical, transport-independent identity for one peer.
pub struct Session {
    /// Write-once identity.
    id: OnceLock<SessionId>,
    /// Wakes `identified()` waiters.
    identified: Notify,
    /// Current transport (owning).
    connection: RwLock<Option<Arc<Connection>>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Session {
    /// Create a detached, unidentified session.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Create a session that reports lifecycle events to `observer`.
    pub fn with_observer(observer: Arc<dyn SessionObserver>) -> Arc<Self> {
        Arc::new(Self::build(Some(observer)))
    }

    fn build(observer: Option<Arc<dyn SessionObserver>>) -> Self {
        Self {
            id: OnceLock::new(),
            identified: Notify::new(),
            connection: RwLock::new(None),
            observer,
        }
    }

    /// The session id, once the handshake has assigned it.
    #[inline]
    pub fn id(&self) -> Option<SessionId> {
        self.id.get().copied()
    }

    /// Assign the session id. Ids are write-once.
    ///
    /// Re-assigning the same id is a no-op.
    ///
    /// # Errors
    ///
    /// `Handshake` if a different id was already assigned.
    pub fn assign_id(self: &Arc<Self>, id: SessionId) -> Result<()> {
        if self.id.set(id).is_err() {
            return match self.id() {
                Some(current) if current == id => Ok(()),
                current => Err(SessionwireError::Handshake(format!(
                    "session already identified as {:?}, refusing {}",
                    current, id
                ))),
            };
        }

        self.identified.notify_waiters();
        if let Some(observer) = &self.observer {
            observer.on_identified(self, id);
        }
        Ok(())
    }

    /// Wait until the session has an id.
    pub async fn identified(&self) -> SessionId {
        loop {
            let notified = self.identified.notified();
            if let Some(id) = self.id() {
                return id;
            }
            notified.await;
        }
    }

    /// The attached connection, if any.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().clone()
    }

    /// Check if a connection is attached.
    pub fn is_attached(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Queue a segment on the attached connection.
    ///
    /// Without an attached connection the segment is dropped and `false`
    /// is returned; sessions never buffer for a future transport.
    pub fn send(&self, segment: impl Into<Segment>) -> bool {
        let connection = self.connection.read().clone();
        match connection {
            Some(connection) => {
                connection.send(segment);
                true
            }
            None => {
                tracing::trace!("Session {:?} has no connection, dropping segment", self.id());
                false
            }
        }
    }

    /// Attach `connection`, replacing any previous one.
    ///
    /// The previous connection is disconnected before the new one becomes
    /// visible to senders.
    pub fn attach(self: &Arc<Self>, connection: Arc<Connection>) {
        connection.link_session(self);

        let previous = {
            let mut slot = self.connection.write();
            if matches!(slot.as_ref(), Some(current) if Arc::ptr_eq(current, &connection)) {
                return;
            }

            let previous = slot.take();
            if let Some(old) = &previous {
                old.unlink_session(self);
                old.disconnect();
            }
            *slot = Some(Arc::clone(&connection));
            previous
        };

        tracing::debug!(
            "Session {:?} attached to connection {}",
            self.id(),
            connection.id()
        );

        if let Some(observer) = &self.observer {
            if previous.is_some() {
                observer.on_detached(self);
            }
            observer.on_attached(self, &connection);
        }
    }

    /// Release the attached connection without disconnecting it.
    pub fn detach(self: &Arc<Self>) -> Option<Arc<Connection>> {
        let previous = self.connection.write().take();
        if previous.is_some() {
            self.notify_detached();
        }
        previous
    }

    /// Detach `connection` only if it is the one currently attached.
    pub(crate) fn detach_connection(self: &Arc<Self>, connection: &Arc<Connection>) -> bool {
        let detached = {
            let mut slot = self.connection.write();
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    slot.take();
                    true
                }
                _ => false,
            }
        };

        if detached {
            tracing::debug!(
                "Session {:?} detached from connection {}",
                self.id(),
                connection.id()
            );
            self.notify_detached();
        }
        detached
    }

    fn notify_detached(self: &Arc<Self>) {
        if let Some(observer) = &self.observer {
            observer.on_detached(self);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("attached", &self.is_attached())
            .finish()
    }
}
