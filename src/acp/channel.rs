//! Agent channel abstraction.
//!
//! The proxy never launches processes itself: it asks an [`AgentSpawner`] for
//! an [`AgentChannel`], a pair of byte streams carrying NDJSON to and from one
//! running agent. Whether the agent is a local child process, a container
//! exec session, or an in-memory test double is the spawner's business.

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tracing::{debug, warn};

use crate::Result;

/// Boxed agent → proxy byte stream.
pub type AgentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed proxy → agent byte stream.
pub type AgentWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bidirectional line-oriented connection to one running agent.
pub struct AgentChannel {
    /// Identifier the channel was spawned for.
    pub agent_name: String,
    /// Agent stdout (or equivalent).
    pub reader: AgentReader,
    /// Agent stdin (or equivalent).
    pub writer: AgentWriter,
    /// Owned child process, if the channel is backed by one.
    pub process: Option<Child>,
}

impl AgentChannel {
    /// Wrap a pair of streams.
    pub fn new(
        agent_name: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: None,
        }
    }

    /// Attach the child process backing this channel.
    #[must_use]
    pub fn with_process(mut self, child: Child) -> Self {
        self.process = Some(child);
        self
    }
}

impl Debug for AgentChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentChannel")
            .field("agent_name", &self.agent_name)
            .field("process", &self.process.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

/// Produces agent channels on demand.
pub trait AgentSpawner: Send + Sync {
    /// Start the agent identified by `agent_name` and connect to it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) with a diagnostic
    /// reason when the agent cannot be started.
    fn spawn(
        &self,
        agent_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AgentChannel>> + Send + '_>>;
}

/// Release a child process: give it `grace` to exit on its own, then kill it.
pub async fn release_process(session_id: &str, mut child: Child, grace: Duration) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(session_id, %status, "agent process exited");
        }
        Ok(Err(err)) => {
            warn!(session_id, %err, "error waiting for agent process");
        }
        Err(_elapsed) => {
            warn!(session_id, "agent process did not exit in time, killing");
            if let Err(err) = child.kill().await {
                warn!(session_id, %err, "failed to kill agent process");
            }
        }
    }
}
