//! `session/new`: spawn an agent, run its handshake, and register the
//! session under a fresh proxy id.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::Dispatcher;
use crate::protocol::payloads::{NewSessionParams, NewSessionResult};
use crate::protocol::{decode_params, Envelope, RpcError};
use crate::session::Session;
use crate::{AppError, Result};

impl Dispatcher {
    pub(super) async fn handle_session_new(&self, envelope: Envelope) -> Result<()> {
        let Some(id) = envelope.id else {
            warn!("dispatcher: dropping session/new sent as a notification");
            return Ok(());
        };
        let params: NewSessionParams = match decode_params(envelope.params) {
            Ok(params) => params,
            Err(e) => return self.reply_error(Some(id), RpcError::invalid_params(e)).await,
        };

        match self.create_session(params).await {
            Ok(result) => self.reply(id, result).await,
            Err(e) => {
                warn!(error = %e, "session creation failed");
                self.reply_error(Some(id), RpcError::session_creation_failed(e))
                    .await
            }
        }
    }

    /// Spawn, handshake, and register one session.
    ///
    /// The session is registered only after both handshake steps succeed, so
    /// it is unreachable from the editor until then. Any failure disposes of
    /// whatever was started.
    async fn create_session(&self, params: NewSessionParams) -> Result<Value> {
        let cwd = params
            .cwd
            .clone()
            .unwrap_or_else(|| self.settings.default_cwd.clone());
        let workspace = self.resolver.resolve(&cwd)?;

        let proxy_session_id = Uuid::new_v4().to_string();
        let channel = self.spawner.spawn(&self.settings.agent_name).await?;
        let session = Session::open(
            proxy_session_id,
            workspace,
            channel,
            &self.session_context(),
        )
        .await;

        match self.handshake(&session, &cwd, params).await {
            Ok(result) => {
                if !self.registry.insert_if_absent(Arc::clone(&session)).await {
                    session.terminate(self.settings.timeouts.shutdown_drain).await;
                    return Err(AppError::Session(format!(
                        "proxy session id {} already in use",
                        session.id()
                    )));
                }
                info!(
                    session_id = session.id(),
                    agent_session_id = session.agent_session_id().unwrap_or_default(),
                    "session ready"
                );
                Ok(result)
            }
            Err(e) => {
                session.terminate(self.settings.timeouts.shutdown_drain).await;
                Err(e)
            }
        }
    }

    /// `initialize` then `session/new` against the session's agent.
    ///
    /// Returns the editor-facing `session/new` result: the agent's result with
    /// `sessionId` replaced by the proxy session id.
    async fn handshake(
        &self,
        session: &Session,
        cwd: &Path,
        mut params: NewSessionParams,
    ) -> Result<Value> {
        let timeout = self.settings.timeouts.handshake;

        let init = self.agent_initialize_params().await;
        let init = serde_json::to_value(init)
            .map_err(|e| AppError::Protocol(format!("failed to serialise initialize: {e}")))?;
        let reply = session
            .request(
                Envelope::request(session.initialize_request_id(), "initialize", Some(init)),
                timeout,
            )
            .await?;
        expect_success("initialize", &reply)?;

        params.cwd = Some(session.translator().to_agent(cwd));
        if let Some(servers) = params.mcp_servers.as_mut() {
            session.translator().translate_launch_specs(servers);
        }
        let params = serde_json::to_value(params)
            .map_err(|e| AppError::Protocol(format!("failed to serialise session/new: {e}")))?;
        let reply = session
            .request(
                Envelope::request(session.session_new_request_id(), "session/new", Some(params)),
                timeout,
            )
            .await?;
        let result = expect_success("session/new", &reply)?;

        let mut created: NewSessionResult = serde_json::from_value(result.clone())
            .map_err(|e| AppError::Acp(format!("malformed session/new result: {e}")))?;
        if created.session_id.is_empty() {
            return Err(AppError::Acp("agent returned no sessionId".into()));
        }
        session.set_agent_session_id(created.session_id.clone());

        created.session_id = session.id().to_owned();
        serde_json::to_value(created)
            .map_err(|e| AppError::Protocol(format!("failed to serialise session/new result: {e}")))
    }
}

/// The `result` of a handshake reply, or an error naming the agent's failure.
fn expect_success<'a>(method: &str, reply: &'a Envelope) -> Result<&'a Value> {
    if let Some(error) = &reply.error {
        return Err(AppError::Acp(format!(
            "agent rejected {method}: {} ({})",
            error.message, error.code
        )));
    }
    reply
        .result
        .as_ref()
        .ok_or_else(|| AppError::Acp(format!("agent sent an empty {method} reply")))
}
