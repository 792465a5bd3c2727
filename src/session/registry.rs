//! Registry of server-side sessions.
//!
//! Sessions are added by the server handshake once identified and removed
//! only by the application. Iteration always happens over a
//! [`snapshot`](SessionRegistry::snapshot), never under the registry lock,
//! so a send that re-enters the registry cannot deadlock.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Session, SessionId};
use crate::writer::Segment;

/// Thread-safe collection of sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns `false` if it is already registered.
    pub fn add(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.iter().any(|s| Arc::ptr_eq(s, &session)) {
            return false;
        }
        sessions.push(session);
        true
    }

    /// Remove a session. Returns `false` if it was not registered.
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.iter().position(|s| Arc::ptr_eq(s, session)) {
            Some(index) => {
                sessions.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Copy of the current members.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().clone()
    }

    /// Find a registered session by id.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.id() == Some(id))
            .cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Send `segment` to every registered session with a live connection.
    ///
    /// Returns how many sessions accepted it.
    pub fn broadcast(&self, segment: impl Into<Segment>) -> usize {
        let segment = segment.into();
        self.snapshot()
            .iter()
            .filter(|session| session.send(segment.clone()))
            .count()
    }
}
