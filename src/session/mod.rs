//! Session: the unit of multiplexing.
//!
//! A [`Session`] owns one agent channel (through its writer task, reader
//! loop, and child process), the table of internal requests waiting on that
//! agent, and the two identities of the conversation: the proxy session id
//! the editor sees and the agent's own session id.
//!
//! Lifecycle: spawn → initialize handshake → active → ending → disposed.
//! The dispatcher drives the handshake; [`Session::terminate`] performs the
//! single ending sequence shared by `session/end` and proxy shutdown.

pub mod pending;
pub mod registry;
pub mod relay;

use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::json;
use tokio::process::Child;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::channel::{release_process, AgentChannel};
use crate::acp::reader::run_reader;
use crate::acp::writer::{run_writer, AGENT_QUEUE_CAPACITY};
use crate::output::OutputQueue;
use crate::protocol::{Envelope, RequestId, RpcError};
use crate::workspace::{PathTranslator, WorkspaceRoot};
use crate::{AppError, Result};

pub use pending::PendingRequests;
pub use registry::SessionRegistry;
pub use relay::{RelayRoute, RelayTable};

/// Minimum time a child process gets to exit before it is killed.
const MIN_RELEASE_GRACE: Duration = Duration::from_millis(100);

/// Proxy-wide handles every session is wired to.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Editor-facing output queue.
    pub output: OutputQueue,
    /// Agent-initiated request routes.
    pub relay: Arc<RelayTable>,
    /// Proxy-wide cancellation; each session derives a child token.
    pub shutdown: CancellationToken,
}

struct SessionTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<Result<()>>,
}

/// One editor session backed by one agent.
pub struct Session {
    proxy_session_id: String,
    agent_session_id: OnceLock<String>,
    agent_name: String,
    workspace: WorkspaceRoot,
    translator: PathTranslator,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    pending: PendingRequests,
    forwarded: Mutex<HashSet<RequestId>>,
    closed: AtomicBool,
    output: OutputQueue,
    relay: Arc<RelayTable>,
    cancel: CancellationToken,
    halt: CancellationToken,
    tasks: Mutex<Option<SessionTasks>>,
    process: Mutex<Option<Child>>,
}

impl Session {
    /// Take ownership of `channel` and start the session's writer task and
    /// reader loop.
    pub async fn open(
        proxy_session_id: String,
        workspace: WorkspaceRoot,
        channel: AgentChannel,
        ctx: &SessionContext,
    ) -> Arc<Self> {
        let AgentChannel {
            agent_name,
            reader,
            writer,
            process,
        } = channel;
        let (tx, rx) = mpsc::channel(AGENT_QUEUE_CAPACITY);

        let session = Arc::new(Self {
            translator: PathTranslator::for_workspace(&workspace),
            proxy_session_id,
            agent_session_id: OnceLock::new(),
            agent_name,
            workspace,
            outbound: Mutex::new(Some(tx)),
            pending: PendingRequests::new(),
            forwarded: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            output: ctx.output.clone(),
            relay: Arc::clone(&ctx.relay),
            cancel: ctx.shutdown.child_token(),
            halt: CancellationToken::new(),
            tasks: Mutex::new(None),
            process: Mutex::new(process),
        });

        let writer = tokio::spawn(run_writer(
            session.proxy_session_id.clone(),
            writer,
            rx,
            session.halt.clone(),
        ));
        let reader = tokio::spawn(run_reader(
            Arc::clone(&session),
            reader,
            session.cancel.clone(),
        ));
        *session.tasks.lock().await = Some(SessionTasks { reader, writer });

        info!(
            session_id = session.proxy_session_id.as_str(),
            agent = session.agent_name.as_str(),
            host_root = %session.workspace.host_root.display(),
            agent_root = %session.workspace.agent_root.display(),
            "session opened"
        );
        session
    }

    /// Proxy session id, as known to the editor.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.proxy_session_id
    }

    /// Agent session id; `None` until the agent's `session/new` succeeded.
    #[must_use]
    pub fn agent_session_id(&self) -> Option<&str> {
        self.agent_session_id.get().map(String::as_str)
    }

    /// Record the agent's session id. Returns `false` if it was already set.
    pub fn set_agent_session_id(&self, agent_session_id: String) -> bool {
        self.agent_session_id.set(agent_session_id).is_ok()
    }

    /// Path translator for this session's workspace.
    #[must_use]
    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    /// Internal request table.
    #[must_use]
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Proxy-wide relay table.
    #[must_use]
    pub fn relay(&self) -> &RelayTable {
        &self.relay
    }

    /// Editor-facing output queue.
    #[must_use]
    pub fn output(&self) -> &OutputQueue {
        &self.output
    }

    /// Whether the agent channel has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Id of the synthetic `initialize` sent to this session's agent.
    #[must_use]
    pub fn initialize_request_id(&self) -> RequestId {
        RequestId::String(format!("init-{}", self.proxy_session_id))
    }

    /// Id of the `session/new` sent to this session's agent.
    #[must_use]
    pub fn session_new_request_id(&self) -> RequestId {
        RequestId::String(format!("session-new-{}", self.proxy_session_id))
    }

    /// Whether `id` belongs to one of the proxy's own handshake requests.
    #[must_use]
    pub fn is_internal_id(&self, id: &RequestId) -> bool {
        *id == self.initialize_request_id() || *id == self.session_new_request_id()
    }

    /// Replace the agent's session id with the proxy's in `params.sessionId`.
    pub fn rewrite_to_proxy(&self, envelope: &mut Envelope) {
        if let Some(agent_id) = self.agent_session_id() {
            envelope.rewrite_session_id(agent_id, &self.proxy_session_id);
        }
    }

    /// Queue an envelope for the agent as-is.
    ///
    /// Never waits for queue capacity, so an agent that stopped reading its
    /// input cannot stall the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] when the agent channel is closed or its
    /// input queue is full.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        let line = envelope.to_line()?;
        let outbound = self.outbound.lock().await;
        let tx = outbound.as_ref().ok_or_else(|| {
            AppError::Acp(format!(
                "agent channel closed for session {}",
                self.proxy_session_id
            ))
        })?;
        tx.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => AppError::Acp(format!(
                "agent input queue full for session {}",
                self.proxy_session_id
            )),
            TrySendError::Closed(_) => AppError::Acp(format!(
                "write failed: agent channel closed for session {}",
                self.proxy_session_id
            )),
        })
    }

    /// Issue an internal request and wait at most `timeout` for its reply.
    ///
    /// The waiter is registered before the request is written. Proxy-wide
    /// cancellation aborts the wait; a timeout aborts only this wait.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when no reply arrives in time.
    /// - [`AppError::Cancelled`] on proxy shutdown.
    /// - [`AppError::Acp`] when the channel closes first.
    pub async fn request(&self, envelope: Envelope, timeout: Duration) -> Result<Envelope> {
        let id = envelope
            .id
            .clone()
            .ok_or_else(|| AppError::Protocol("internal request without an id".into()))?;
        let method = envelope.method.clone().unwrap_or_default();

        // Registered before the closed check: a reader EOF after the check
        // clears this waiter instead of leaving it to the timeout.
        let waiter = self.pending.register(id.clone()).await;
        if self.is_closed() {
            self.pending.cancel(&id).await;
            return Err(AppError::Acp(format!(
                "agent channel closed before {method} was sent"
            )));
        }
        if let Err(e) = self.send(envelope).await {
            self.pending.cancel(&id).await;
            return Err(e);
        }

        let outcome = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                Err(AppError::Cancelled(format!("{method} aborted by shutdown")))
            }

            reply = tokio::time::timeout(timeout, waiter) => match reply {
                Ok(Ok(envelope)) => Ok(envelope),
                Ok(Err(_)) => Err(AppError::Acp(format!(
                    "agent channel closed before replying to {method}"
                ))),
                Err(_) => Err(AppError::Timeout(format!(
                    "agent did not answer {method} within {timeout:?}"
                ))),
            },
        };

        if outcome.is_err() {
            self.pending.cancel(&id).await;
        }
        outcome
    }

    /// Forward an editor call to the agent, rewriting `sessionId`
    /// proxy → agent and tracking the id until the agent answers.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] when the agent channel is closed or the
    /// agent's input queue is full; the call is then not tracked.
    pub async fn forward(&self, mut envelope: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::Acp(format!(
                "agent for session {} is no longer running",
                self.proxy_session_id
            )));
        }
        if let Some(agent_id) = self.agent_session_id() {
            envelope.rewrite_session_id(&self.proxy_session_id, agent_id);
        }

        let id = envelope.id.clone();
        if let Some(id) = &id {
            self.forwarded.lock().await.insert(id.clone());
        }
        let sent = self.send(envelope).await;
        if sent.is_err() {
            if let Some(id) = &id {
                self.forwarded.lock().await.remove(id);
            }
        }
        sent
    }

    /// Mark a forwarded editor request as answered.
    ///
    /// Returns `false` when `id` was not awaiting an answer: the request was
    /// never forwarded, was already answered, or was failed at session end.
    pub async fn complete_forwarded(&self, id: &RequestId) -> bool {
        self.forwarded.lock().await.remove(id)
    }

    /// Called by the reader loop when the agent's output ends.
    pub async fn on_channel_closed(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(session_id = self.proxy_session_id.as_str(), reason, "agent channel closed");
        self.pending.clear().await;
        self.fail_forwarded(reason).await;
    }

    /// Answer every still-open forwarded request with an internal error.
    async fn fail_forwarded(&self, reason: &str) {
        let open: Vec<RequestId> = self.forwarded.lock().await.drain().collect();
        for id in open {
            debug!(session_id = self.proxy_session_id.as_str(), %id, "failing unanswered request");
            let reply = Envelope::error_response(
                Some(id),
                RpcError::internal(format!("Session ended before responding: {reason}")),
            );
            if let Err(e) = self.output.enqueue(&reply).await {
                debug!(session_id = self.proxy_session_id.as_str(), error = %e,
                    "could not enqueue failure reply");
            }
        }
    }

    /// Run the ending sequence: notify the agent with a `session/end`
    /// notification, close its input, wait at most `drain` for the writer and
    /// reader to finish, then release the channel.
    ///
    /// Only the first call does anything; later calls return immediately.
    pub async fn terminate(&self, drain: Duration) {
        let Some(SessionTasks {
            mut reader,
            mut writer,
        }) = self.tasks.lock().await.take()
        else {
            return;
        };
        let session_id = self.proxy_session_id.as_str();
        let deadline = Instant::now() + drain;
        info!(session_id, ?drain, "terminating session");

        let mut halted = false;
        if let Some(agent_id) = self.agent_session_id() {
            // Never a request: the proxy answers the editor itself, and an
            // agent reply must not reach the editor.
            let end = Envelope::notification("session/end", Some(json!({ "sessionId": agent_id })));
            if let Err(e) = self.send(end).await {
                warn!(session_id, error = %e, "could not queue session/end, halting agent writer");
                self.halt.cancel();
                writer.abort();
                halted = true;
            }
        }

        // Dropping the only sender lets the writer flush and close the
        // agent's input.
        self.outbound.lock().await.take();

        if !halted {
            match tokio::time::timeout_at(deadline, &mut writer).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => debug!(session_id, error = %e, "agent writer ended with error"),
                Ok(Err(e)) => warn!(session_id, error = %e, "agent writer task failed"),
                Err(_) => {
                    warn!(session_id, "agent writer did not finish in time, halting");
                    self.halt.cancel();
                    writer.abort();
                }
            }
        }

        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            warn!(session_id, "agent reader did not drain in time, cancelling");
            self.cancel.cancel();
            reader.abort();
        }
        self.cancel.cancel();
        self.halt.cancel();

        if let Some(child) = self.process.lock().await.take() {
            let grace = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_RELEASE_GRACE);
            release_process(session_id, child, grace).await;
        }

        self.closed.store(true, Ordering::Release);
        self.pending.clear().await;
        self.fail_forwarded("session terminated").await;
        self.relay.forget_session(session_id).await;
        info!(session_id, "session disposed");
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("proxy_session_id", &self.proxy_session_id)
            .field("agent_session_id", &self.agent_session_id.get())
            .field("agent_name", &self.agent_name)
            .field("workspace", &self.workspace)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
