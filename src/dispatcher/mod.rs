//! Editor-facing dispatcher.
//!
//! Decodes each line the editor sends and routes it:
//!
//! | Input                                       | Handling                                  |
//! |---------------------------------------------|-------------------------------------------|
//! | not JSON                                    | `-32700` with a `null` id                 |
//! | JSON call that is not a valid envelope      | `-32600` (requests) / dropped             |
//! | response-shaped, invalid                    | ignored                                   |
//! | response                                    | relayed to the agent that asked, if any   |
//! | `initialize`                                | answered by the proxy                     |
//! | `session/new`                               | creates a session                         |
//! | `session/end`                               | terminates a session                      |
//! | other session-scoped method                 | forwarded to the owning agent             |
//! | anything else                               | `-32601` (requests) / dropped             |
//!
//! Lines are handled strictly one at a time, in arrival order.

mod initialize;
mod lifecycle;
mod scoped;
mod session_new;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::acp::channel::AgentSpawner;
use crate::config::Timeouts;
use crate::output::OutputQueue;
use crate::protocol::payloads::InitializeParams;
use crate::protocol::{Envelope, Kind, RequestId, RpcError, Shape};
use crate::session::{RelayTable, SessionContext, SessionRegistry};
use crate::workspace::WorkspaceResolver;
use crate::Result;

/// Session-scoped methods forwarded to the owning agent unchanged apart from
/// the `sessionId` rewrite.
pub const FORWARDED_SCOPED_METHODS: &[&str] = &[
    "session/prompt",
    "session/cancel",
    "session/set_mode",
    "session/set_model",
];

/// Static dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Agent identifier handed to the spawner for every session.
    pub agent_name: String,
    /// `cwd` used when `session/new` omits one.
    pub default_cwd: PathBuf,
    /// Name reported in `serverInfo`.
    pub server_name: String,
    /// Handshake and drain bounds.
    pub timeouts: Timeouts,
}

/// Routes editor messages to the proxy's handlers and to sessions.
pub struct Dispatcher {
    settings: DispatcherSettings,
    spawner: Arc<dyn AgentSpawner>,
    resolver: Arc<dyn WorkspaceResolver>,
    registry: SessionRegistry,
    relay: Arc<RelayTable>,
    output: OutputQueue,
    shutdown: CancellationToken,
    editor_init: Mutex<Option<InitializeParams>>,
}

impl Dispatcher {
    /// Create a dispatcher writing to `output`.
    ///
    /// `shutdown` is the proxy-wide cancellation signal; cancelling it stops
    /// [`Dispatcher::run`] and aborts in-flight agent waits.
    #[must_use]
    pub fn new(
        settings: DispatcherSettings,
        spawner: Arc<dyn AgentSpawner>,
        resolver: Arc<dyn WorkspaceResolver>,
        output: OutputQueue,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            spawner,
            resolver,
            registry: SessionRegistry::new(),
            relay: Arc::new(RelayTable::new()),
            output,
            shutdown,
            editor_init: Mutex::new(None),
        }
    }

    /// Live sessions.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Routes for agent-initiated requests awaiting an editor response.
    #[must_use]
    pub fn relay(&self) -> &RelayTable {
        &self.relay
    }

    /// Handle one line from the editor.
    ///
    /// # Errors
    ///
    /// Returns an error only when the output sequencer has stopped, which is
    /// transport-fatal.
    pub async fn handle_line(&self, line: &str) -> Result<()> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let raw: Value = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "dispatcher: editor sent invalid JSON");
                return self.reply_error(None, RpcError::parse_error(e)).await;
            }
        };

        let shape = Shape::of(&raw);
        let envelope = match Envelope::from_value(raw) {
            Ok(envelope) => envelope,
            Err(e) => return self.reject_invalid(&shape, &e).await,
        };

        let method = match envelope.kind() {
            Ok(Kind::Response { .. }) => None,
            Ok(Kind::Request { method, .. } | Kind::Notification { method }) => {
                Some(method.to_owned())
            }
            Err(e) => return self.reject_invalid(&shape, &e).await,
        };
        let Some(method) = method else {
            return self.relay_editor_response(envelope).await;
        };

        trace!(method = method.as_str(), id = ?envelope.id, "dispatcher: routing");
        match method.as_str() {
            "initialize" => self.handle_initialize(envelope).await,
            "session/new" => self.handle_session_new(envelope).await,
            "session/end" => self.handle_session_end(envelope).await,
            m if FORWARDED_SCOPED_METHODS.contains(&m) => self.handle_scoped(envelope).await,
            _ => match envelope.id {
                Some(id) => {
                    self.reply_error(Some(id), RpcError::method_not_found(&method))
                        .await
                }
                None => {
                    debug!(method = method.as_str(), "dispatcher: dropping unknown notification");
                    Ok(())
                }
            },
        }
    }

    /// Answer or drop a message that is JSON but not a usable envelope.
    async fn reject_invalid(&self, shape: &Shape, err: &crate::AppError) -> Result<()> {
        if shape.response_shaped {
            debug!(error = %err, "dispatcher: ignoring malformed editor response");
            return Ok(());
        }
        match (&shape.id, shape.has_method) {
            (Some(id), true) => {
                warn!(error = %err, %id, "dispatcher: invalid request");
                self.reply_error(Some(id.clone()), RpcError::invalid_request(err))
                    .await
            }
            _ => {
                debug!(error = %err, "dispatcher: dropping invalid message");
                Ok(())
            }
        }
    }

    /// Deliver an editor response to the agent whose request it answers.
    async fn relay_editor_response(&self, mut envelope: Envelope) -> Result<()> {
        let Some(id) = envelope.id.clone() else {
            debug!("dispatcher: dropping editor response without id");
            return Ok(());
        };
        let Some(route) = self.relay.take(&id).await else {
            debug!(%id, "dispatcher: dropping editor response with unknown id");
            return Ok(());
        };
        let Some(session) = self.registry.get(&route.proxy_session_id).await else {
            debug!(%id, session_id = route.proxy_session_id.as_str(),
                "dispatcher: editor response for a session that has ended");
            return Ok(());
        };

        envelope.id = Some(route.original_id);
        if let Err(e) = session.send(envelope).await {
            warn!(session_id = session.id(), error = %e, "dispatcher: could not relay editor response");
        }
        Ok(())
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            output: self.output.clone(),
            relay: Arc::clone(&self.relay),
            shutdown: self.shutdown.clone(),
        }
    }

    async fn reply(&self, id: RequestId, result: Value) -> Result<()> {
        self.output.enqueue(&Envelope::response(id, result)).await
    }

    async fn reply_error(&self, id: Option<RequestId>, error: RpcError) -> Result<()> {
        self.output
            .enqueue(&Envelope::error_response(id, error))
            .await
    }
}
