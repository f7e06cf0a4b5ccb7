//! Direct-process [`AgentSpawner`].
//!
//! Launches the configured agent command with:
//! - `kill_on_drop(true)` so a channel that is dropped without an orderly
//!   release never leaves an orphaned agent behind.
//! - `env_clear()` plus an allowlist, so the proxy's environment does not
//!   leak wholesale into every agent.
//! - stdin/stdout piped for the NDJSON channel and stderr inherited, keeping
//!   agent diagnostics on the proxy's stderr and off the protocol stream.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::acp::channel::{AgentChannel, AgentSpawner};
use crate::config::AgentCommand;
use crate::{AppError, Result};

/// Environment variables inherited by every spawned agent.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "TERM",
    "TMPDIR",
    "RUST_LOG",
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Spawns agents as local child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpawner {
    agents: HashMap<String, AgentCommand>,
}

impl ProcessSpawner {
    /// Create a spawner over the configured agent commands.
    #[must_use]
    pub fn new(agents: HashMap<String, AgentCommand>) -> Self {
        Self { agents }
    }

    /// Look up `agent_name`, falling back to treating it as a command line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the name is neither configured nor a
    /// usable command line.
    pub fn command_for(&self, agent_name: &str) -> Result<AgentCommand> {
        if let Some(cmd) = self.agents.get(agent_name) {
            return Ok(cmd.clone());
        }
        AgentCommand::from_command_line(agent_name)
            .ok_or_else(|| AppError::Spawn(format!("unknown agent '{agent_name}'")))
    }

    fn build_command(spec: &AgentCommand) -> Command {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);

        // Strip inherited environment, then inject only the allowlist.
        cmd.env_clear();
        let inherited = ALLOWED_ENV_VARS
            .iter()
            .copied()
            .chain(spec.inherit_env.iter().map(String::as_str));
        for key in inherited {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.envs(&spec.env);

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl AgentSpawner for ProcessSpawner {
    fn spawn(
        &self,
        agent_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AgentChannel>> + Send + '_>> {
        let agent_name = agent_name.to_owned();
        Box::pin(async move {
            let spec = self.command_for(&agent_name)?;
            let mut child = Self::build_command(&spec).spawn().map_err(|err| {
                AppError::Spawn(format!("failed to spawn agent '{agent_name}': {err}"))
            })?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;

            info!(
                agent = agent_name.as_str(),
                command = spec.command.as_str(),
                pid = child.id(),
                "agent process spawned"
            );

            Ok(AgentChannel::new(agent_name, stdout, stdin).with_process(child))
        })
    }
}
