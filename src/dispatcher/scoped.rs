//! Session-scoped methods: `session/end` is terminated by the proxy, the rest
//! are forwarded to the owning agent.

use tracing::{debug, warn};

use super::Dispatcher;
use crate::protocol::payloads::SessionScoped;
use crate::protocol::{decode_params, empty_result, Envelope, RpcError};
use crate::Result;

impl Dispatcher {
    /// Forward `session/prompt`, `session/cancel`, and friends.
    ///
    /// The agent's reply reaches the editor through the session's reader
    /// loop, never through this call.
    pub(super) async fn handle_scoped(&self, envelope: Envelope) -> Result<()> {
        let Some(session_id) = self.scoped_session_id(&envelope).await? else {
            return Ok(());
        };
        let Some(session) = self.registry.get(&session_id).await else {
            return self.reply_not_found(&envelope, &session_id).await;
        };

        let id = envelope.id.clone();
        if let Err(e) = session.forward(envelope).await {
            warn!(session_id = session.id(), error = %e, "forward to agent failed");
            if let Some(id) = id {
                return self.reply_error(Some(id), RpcError::internal(e)).await;
            }
        }
        Ok(())
    }

    /// Remove the session, run its ending sequence, then acknowledge.
    ///
    /// The acknowledgement is produced by the proxy; the agent only ever sees
    /// a `session/end` notification.
    pub(super) async fn handle_session_end(&self, envelope: Envelope) -> Result<()> {
        let Some(session_id) = self.scoped_session_id(&envelope).await? else {
            return Ok(());
        };
        // Whoever removes the entry owns the termination.
        let Some(session) = self.registry.remove(&session_id).await else {
            return self.reply_not_found(&envelope, &session_id).await;
        };
        session.terminate(self.settings.timeouts.end_drain).await;

        match envelope.id {
            Some(id) => self.reply(id, empty_result()).await,
            None => Ok(()),
        }
    }

    /// Decode `params.sessionId`. `Ok(None)` means the params were unusable
    /// and the editor has already been answered (or the notification dropped).
    async fn scoped_session_id(&self, envelope: &Envelope) -> Result<Option<String>> {
        match decode_params::<SessionScoped>(envelope.params.clone()) {
            Ok(scoped) => Ok(Some(scoped.session_id)),
            Err(e) => {
                let method = envelope.method.as_deref().unwrap_or_default();
                debug!(method, error = %e, "dispatcher: bad session-scoped params");
                if let Some(id) = &envelope.id {
                    self.reply_error(Some(id.clone()), RpcError::invalid_params(e))
                        .await?;
                }
                Ok(None)
            }
        }
    }

    async fn reply_not_found(&self, envelope: &Envelope, session_id: &str) -> Result<()> {
        let method = envelope.method.as_deref().unwrap_or_default();
        debug!(method, session_id, "dispatcher: unknown session");
        match envelope.id.clone() {
            Some(id) => {
                self.reply_error(Some(id), RpcError::session_not_found(session_id))
                    .await
            }
            None => Ok(()),
        }
    }
}
