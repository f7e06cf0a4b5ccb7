//! Pending-request table for calls the proxy itself issues to an agent.
//!
//! A waiter must be registered *before* its request is written to the agent;
//! otherwise a fast reply could arrive while nobody is listening and be
//! forwarded to the editor instead.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use crate::protocol::{Envelope, RequestId};

/// Single-fulfilment waiters keyed by normalized request id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<Envelope>>>,
}

impl PendingRequests {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`, replacing any stale one.
    pub async fn register(&self, id: RequestId) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        rx
    }

    /// Deliver `reply` to its waiter.
    ///
    /// Returns the envelope back when no waiter is registered for its id, so
    /// the caller can forward it instead.
    pub async fn fulfill(&self, reply: Envelope) -> Option<Envelope> {
        let Some(id) = reply.id.as_ref() else {
            return Some(reply);
        };
        let waiter = self.waiters.lock().await.remove(id);
        match waiter {
            Some(tx) => {
                // A waiter that already gave up has dropped its receiver;
                // the reply is consumed either way.
                let _ = tx.send(reply);
                None
            }
            None => Some(reply),
        }
    }

    /// Drop the waiter for `id` (timeout or cancellation).
    pub async fn cancel(&self, id: &RequestId) {
        self.waiters.lock().await.remove(id);
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub async fn clear(&self) {
        self.waiters.lock().await.clear();
    }

    /// Number of outstanding waiters.
    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }

    /// Whether no waiter is outstanding.
    pub async fn is_empty(&self) -> bool {
        self.waiters.lock().await.is_empty()
    }
}
