//! Routing table for agent-initiated requests.
//!
//! Agents issue requests to the editor (`session/request_permission`,
//! `fs/read_text_file`, …) using their own id sequences, which collide across
//! agents. Each such request is re-keyed to a proxy-unique id before it is
//! forwarded; the editor's response is mapped back to the owning session and
//! the agent's original id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::protocol::RequestId;

/// Where an editor response must be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRoute {
    /// Session that owns the agent which issued the request.
    pub proxy_session_id: String,
    /// Id the agent used.
    pub original_id: RequestId,
}

/// Proxy-wide table of in-flight agent-initiated requests.
#[derive(Debug, Default)]
pub struct RelayTable {
    next: AtomicU64,
    routes: Mutex<HashMap<RequestId, RelayRoute>>,
}

impl RelayTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an agent request and return the id to show the editor.
    pub async fn register(&self, proxy_session_id: &str, original_id: RequestId) -> RequestId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let relay_id = RequestId::String(format!("{proxy_session_id}/{n}"));
        self.routes.lock().await.insert(
            relay_id.clone(),
            RelayRoute {
                proxy_session_id: proxy_session_id.to_owned(),
                original_id,
            },
        );
        relay_id
    }

    /// Remove and return the route for an editor response id.
    pub async fn take(&self, relay_id: &RequestId) -> Option<RelayRoute> {
        self.routes.lock().await.remove(relay_id)
    }

    /// Discard every route owned by a terminated session.
    pub async fn forget_session(&self, proxy_session_id: &str) {
        self.routes
            .lock()
            .await
            .retain(|_, route| route.proxy_session_id != proxy_session_id);
    }

    /// Number of in-flight routes.
    pub async fn len(&self) -> usize {
        self.routes.lock().await.len()
    }

    /// Whether no route is in flight.
    pub async fn is_empty(&self) -> bool {
        self.routes.lock().await.is_empty()
    }
}
