//! Per-session agent reader loop.
//!
//! Consumes NDJSON lines from one agent until the channel closes or the
//! session is cancelled. Each decoded envelope takes exactly one path:
//!
//! | Envelope                                   | Action                                        |
//! |--------------------------------------------|-----------------------------------------------|
//! | response matching a pending internal call  | fulfil the waiter; not forwarded              |
//! | response to a forwarded editor request     | clear bookkeeping, forward                    |
//! | any other response, including a `null` id  | dropped                                       |
//! | agent-initiated request                    | give it a proxy-unique id, rewrite, forward   |
//! | notification                               | rewrite `sessionId`, forward                  |
//!
//! "Rewrite" replaces the agent's session id in `params.sessionId` with the
//! proxy's. Malformed lines are logged and skipped; they never end the loop.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::acp::codec::AcpCodec;
use crate::protocol::{Envelope, Kind, RequestId};
use crate::session::Session;
use crate::{AppError, Result};

/// Reader loop for one session.
///
/// On EOF or an unrecoverable I/O error the session is told its channel
/// closed, which answers any editor requests still waiting on this agent.
/// Cancellation exits without that step; termination handles it.
pub async fn run_reader<R>(session: Arc<Session>, reader: R, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let session_id = session.id().to_owned();
    let mut framed = FramedRead::new(reader, AcpCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "agent reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(session_id, "agent reader: EOF detected");
                        session.on_channel_closed("agent closed its output").await;
                        break;
                    }

                    Some(Err(AppError::Acp(ref msg))) => {
                        warn!(
                            session_id,
                            error = msg.as_str(),
                            "agent reader: codec framing error, skipping"
                        );
                    }

                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "agent reader: IO error, stopping");
                        session.on_channel_closed(&format!("agent stream error: {e}")).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let envelope = match Envelope::decode(&line) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                warn!(
                                    session_id,
                                    error = %e,
                                    raw_line = %line,
                                    "agent reader: parse error, skipping line"
                                );
                                continue;
                            }
                        };
                        if let Err(e) = route_agent_envelope(&session, envelope).await {
                            debug!(session_id, error = %e, "agent reader: output closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Route one envelope received from the agent.
///
/// # Errors
///
/// Returns an error only when the output sequencer no longer accepts
/// messages, which means the proxy is shutting down.
pub async fn route_agent_envelope(session: &Session, mut envelope: Envelope) -> Result<()> {
    let route = match envelope.kind() {
        Ok(Kind::Response { id }) => Route::Reply(id.cloned()),
        Ok(Kind::Request { id, .. }) => Route::AgentRequest(id.clone()),
        Ok(Kind::Notification { .. }) => Route::Notification,
        Err(e) => {
            warn!(session_id = session.id(), error = %e, "agent reader: invalid envelope, skipping");
            return Ok(());
        }
    };

    match route {
        Route::Reply(Some(id)) => {
            let Some(unclaimed) = session.pending().fulfill(envelope).await else {
                trace!(session_id = session.id(), %id, "agent reader: internal reply delivered");
                return Ok(());
            };
            if session.is_internal_id(&id) {
                debug!(session_id = session.id(), %id, "agent reader: late internal reply dropped");
                return Ok(());
            }
            if !session.complete_forwarded(&id).await {
                debug!(session_id = session.id(), %id, "agent reader: unsolicited reply dropped");
                return Ok(());
            }
            envelope = unclaimed;
        }
        Route::Reply(None) => {
            debug!(session_id = session.id(), "agent reader: reply without id dropped");
            return Ok(());
        }
        Route::AgentRequest(original) => {
            session.rewrite_to_proxy(&mut envelope);
            envelope.id = Some(session.relay().register(session.id(), original).await);
        }
        Route::Notification => {
            session.rewrite_to_proxy(&mut envelope);
        }
    }

    session.output().enqueue(&envelope).await
}

enum Route {
    Reply(Option<RequestId>),
    AgentRequest(RequestId),
    Notification,
}
