//! Agent writer task.
//!
//! Owns the proxy → agent half of an [`AgentChannel`](crate::acp::channel::AgentChannel).
//! Serialized envelopes arrive on an [`mpsc`] channel and are written in
//! arrival order, one NDJSON line each, so messages to one agent are never
//! reordered or interleaved.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::AcpCodec;
use crate::{AppError, Result};

/// Capacity of each session's outbound queue.
pub const AGENT_QUEUE_CAPACITY: usize = 256;

/// Agent writer task: writes queued lines to the agent until the queue closes.
///
/// The task exits cleanly when:
/// - every sender for `msg_rx` has been dropped and the queue is drained
///   (orderly close; the agent's input is then shut down so it sees EOF), or
/// - `halt` is triggered (hard stop for an agent that stopped reading).
///
/// # Errors
///
/// Returns [`AppError::Acp`]`("write failed: …")` if writing to the agent
/// fails, e.g. because the process has exited.
pub async fn run_writer<W>(
    session_id: String,
    writer: W,
    mut msg_rx: mpsc::Receiver<String>,
    halt: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(writer, AcpCodec::new());

    loop {
        tokio::select! {
            biased;

            () = halt.cancelled() => {
                debug!(session_id, "agent writer: halted");
                return Ok(());
            }

            msg = msg_rx.recv() => {
                let Some(line) = msg else {
                    debug!(session_id, "agent writer: queue closed, closing agent input");
                    break;
                };
                framed.send(line).await.map_err(|e| {
                    warn!(session_id, error = %e, "agent writer: write failed");
                    AppError::Acp(format!("write failed: {e}"))
                })?;
            }
        }
    }

    // Closing flushes and shuts down the agent's input so it observes EOF.
    if let Err(e) = SinkExt::<String>::close(&mut framed).await {
        debug!(session_id, error = %e, "agent writer: close failed");
    }
    Ok(())
}
