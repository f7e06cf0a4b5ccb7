//! Typed payloads for the methods the proxy terminates or rewrites.
//!
//! Every struct carries a flattened `extensions` bag so fields this crate
//! does not model (vendor `_meta`, newer protocol additions) survive a
//! decode/encode cycle unchanged.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Protocol version sent to agents when the editor never initialized.
pub const DEFAULT_PROTOCOL_VERSION: u64 = 1;

/// `initialize` params as sent by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Requested protocol version, echoed back verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<Value>,
    /// Editor capabilities, forwarded to each agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_capabilities: Option<Value>,
    /// Editor identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Value>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl InitializeParams {
    /// Params used for agent handshakes when the editor skipped `initialize`.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            protocol_version: Some(json!(DEFAULT_PROTOCOL_VERSION)),
            client_capabilities: Some(json!({})),
            client_info: None,
            extensions: Map::new(),
        }
    }
}

/// Capabilities the proxy itself advertises.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCapabilities {
    /// One editor connection may hold several concurrent sessions.
    pub multi_session: bool,
}

/// Proxy identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// `initialize` result produced by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// The editor's requested version, unmodified.
    pub protocol_version: Value,
    /// Proxy capabilities.
    pub capabilities: ProxyCapabilities,
    /// Agent capabilities as seen by ACP clients; empty until a session exists.
    pub agent_capabilities: Value,
    /// No proxy-level authentication is offered.
    pub auth_methods: Vec<Value>,
    /// Proxy identity.
    pub server_info: ServerInfo,
}

impl InitializeResult {
    /// Build the proxy's `initialize` reply.
    #[must_use]
    pub fn new(protocol_version: Value, server_name: &str) -> Self {
        Self {
            protocol_version,
            capabilities: ProxyCapabilities {
                multi_session: true,
            },
            agent_capabilities: json!({}),
            auth_methods: Vec::new(),
            server_info: ServerInfo {
                name: server_name.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        }
    }
}

/// `session/new` params.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionParams {
    /// Editor-side working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Tool/MCP server launch specs; may reference host paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<Value>>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// `session/new` result as returned by the agent and, rewritten, by the proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResult {
    /// Session id; empty when the agent omitted it.
    #[serde(default)]
    pub session_id: String,
    /// Vendor extension fields (`modes`, `models`, `_meta`, …) merged through.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Params of any session-scoped method (`session/prompt`, `session/end`, …).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionScoped {
    /// Proxy session id as known to the editor.
    pub session_id: String,
    /// Everything else; forwarded untouched.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}
