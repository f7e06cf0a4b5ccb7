//! `initialize`: answered by the proxy itself; no agent is involved.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::Dispatcher;
use crate::protocol::payloads::{InitializeParams, InitializeResult, DEFAULT_PROTOCOL_VERSION};
use crate::protocol::{decode_params, Envelope, RpcError};
use crate::{AppError, Result};

impl Dispatcher {
    /// Cache the editor's handshake params for later agent handshakes and
    /// reply with the proxy's capabilities.
    pub(super) async fn handle_initialize(&self, envelope: Envelope) -> Result<()> {
        let params: InitializeParams = match decode_params(envelope.params) {
            Ok(params) => params,
            Err(e) => {
                return match envelope.id {
                    Some(id) => self.reply_error(Some(id), RpcError::invalid_params(e)).await,
                    None => Ok(()),
                };
            }
        };

        let version = params
            .protocol_version
            .clone()
            .unwrap_or_else(|| json!(DEFAULT_PROTOCOL_VERSION));
        info!(protocol_version = %version, "editor initialized");

        let replaced = self.editor_init.lock().await.replace(params).is_some();
        if replaced {
            debug!("editor re-initialized; later sessions use the new params");
        }

        let Some(id) = envelope.id else {
            return Ok(());
        };
        let result = InitializeResult::new(version, &self.settings.server_name);
        let result: Value = serde_json::to_value(result)
            .map_err(|e| AppError::Protocol(format!("failed to serialise initialize result: {e}")))?;
        self.reply(id, result).await
    }

    /// Params for an agent handshake: the editor's, or a minimal default.
    pub(super) async fn agent_initialize_params(&self) -> InitializeParams {
        self.editor_init
            .lock()
            .await
            .clone()
            .unwrap_or_else(InitializeParams::fallback)
    }
}
