//! Session registry: proxy session id → live session.
//!
//! The registry is the only state touched by more than one flow (the
//! dispatcher creating and ending sessions, shutdown terminating all of
//! them). Every mutation is a single atomic step under the lock, so a session
//! is registered at most once and removed at most once; whoever removes it
//! owns its termination.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::Session;

/// Concurrent map of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` unless its id is already taken.
    ///
    /// Returns `false` (and leaves the existing entry alone) on a collision.
    pub async fn insert_if_absent(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.entry(session.id().to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(session_id = session.id(), "session registered");
                slot.insert(session);
                true
            }
        }
    }

    /// Look up a session without removing it.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Remove a session if present; the caller becomes responsible for
    /// terminating it.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.remove(session_id)
    }

    /// Remove and return every session.
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.drain().map(|(_, s)| s).collect()
    }

    /// Ids of all registered sessions.
    pub async fn ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
