//! Proxy configuration parsing and validation.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Launch description for one agent identifier.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentCommand {
    /// Executable to run (e.g. `claude-code-acp`, `gemini`).
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables set on the child.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Additional variable names inherited from the proxy's environment.
    #[serde(default)]
    pub inherit_env: Vec<String>,
}

impl AgentCommand {
    /// Interpret a whitespace-separated command line as an agent command.
    ///
    /// Returns `None` for a blank line.
    #[must_use]
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_owned);
        let command = parts.next()?;
        Some(Self {
            command,
            args: parts.collect(),
            env: HashMap::new(),
            inherit_env: Vec::new(),
        })
    }
}

/// Host-to-agent workspace root mapping used by the default resolver.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkspaceMapping {
    /// Editor-side root.
    pub host_root: PathBuf,
    /// Where `host_root` is mounted inside the agent's filesystem.
    pub container_root: PathBuf,
}

/// Timeout values in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Bound on each agent round-trip during `session/new`.
    #[serde(default = "default_handshake_seconds")]
    pub handshake_seconds: u64,
    /// Reader drain bound for an explicit `session/end`.
    #[serde(default = "default_end_drain_seconds")]
    pub end_drain_seconds: u64,
    /// Per-session reader drain bound during proxy shutdown.
    #[serde(default = "default_shutdown_drain_seconds")]
    pub shutdown_drain_seconds: u64,
}

fn default_handshake_seconds() -> u64 {
    30
}

fn default_end_drain_seconds() -> u64 {
    5
}

fn default_shutdown_drain_seconds() -> u64 {
    2
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_seconds: default_handshake_seconds(),
            end_drain_seconds: default_end_drain_seconds(),
            shutdown_drain_seconds: default_shutdown_drain_seconds(),
        }
    }
}

/// Resolved timeouts used at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on each agent round-trip during `session/new`.
    pub handshake: Duration,
    /// Reader drain bound for an explicit `session/end`.
    pub end_drain: Duration,
    /// Per-session reader drain bound during proxy shutdown.
    pub shutdown_drain: Duration,
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(cfg: &TimeoutConfig) -> Self {
        Self {
            handshake: Duration::from_secs(cfg.handshake_seconds),
            end_drain: Duration::from_secs(cfg.end_drain_seconds),
            shutdown_drain: Duration::from_secs(cfg.shutdown_drain_seconds),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

fn default_server_name() -> String {
    "acp-mux".into()
}

/// Proxy configuration parsed from an optional TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProxyConfig {
    /// Agent identifier spawned for every session unless `--agent` overrides it.
    #[serde(default)]
    pub default_agent: Option<String>,
    /// Named agent launch commands.
    #[serde(default)]
    pub agents: HashMap<String, AgentCommand>,
    /// Workspace root mappings (`[[workspace]]` tables).
    #[serde(default, rename = "workspace")]
    pub workspaces: Vec<WorkspaceMapping>,
    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Name reported in `serverInfo`.
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default_agent: None,
            agents: HashMap::new(),
            workspaces: Vec::new(),
            timeouts: TimeoutConfig::default(),
            server_name: default_server_name(),
        }
    }
}

impl ProxyConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Runtime timeouts.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from(&self.timeouts)
    }

    fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        if t.handshake_seconds == 0 || t.end_drain_seconds == 0 || t.shutdown_drain_seconds == 0 {
            return Err(AppError::Config(
                "timeouts must be greater than zero".into(),
            ));
        }

        for (name, agent) in &self.agents {
            if agent.command.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "agent '{name}' has an empty command"
                )));
            }
        }

        if let Some(default) = &self.default_agent {
            if !self.agents.is_empty() && !self.agents.contains_key(default) {
                return Err(AppError::Config(format!(
                    "default_agent '{default}' is not defined under [agents]"
                )));
            }
        }

        let mut seen = HashSet::new();
        for mapping in &self.workspaces {
            if !mapping.host_root.is_absolute() || !mapping.container_root.is_absolute() {
                return Err(AppError::Config(format!(
                    "workspace roots must be absolute: {} -> {}",
                    mapping.host_root.display(),
                    mapping.container_root.display()
                )));
            }
            if !seen.insert(&mapping.host_root) {
                return Err(AppError::Config(format!(
                    "duplicate workspace host_root: {}",
                    mapping.host_root.display()
                )));
            }
        }

        Ok(())
    }
}
