//! Output sequencer: the single owner of the editor-facing stream.
//!
//! Every component that wants to talk to the editor enqueues a serialized
//! envelope on an [`OutputQueue`]; one writer task drains the queue and writes
//! each line whole. Wire order is therefore arrival order at the queue,
//! independent of which session produced a message.
//!
//! Shutdown is two-phase: producers stop enqueueing, [`OutputSequencer::finish`]
//! marks the queue complete, and the writer drains what is left before it
//! exits.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::acp::codec::AcpCodec;
use crate::protocol::Envelope;
use crate::{AppError, Result};

/// Capacity of the editor-facing queue.
pub const OUTPUT_QUEUE_CAPACITY: usize = 1024;

/// Cloneable producer handle for the editor-facing stream.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    tx: mpsc::Sender<String>,
}

impl OutputQueue {
    /// Serialize `envelope` and enqueue it for the editor.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] once the sequencer has stopped accepting
    /// messages (completed, or the editor stream failed).
    pub async fn enqueue(&self, envelope: &Envelope) -> Result<()> {
        let line = envelope.to_line()?;
        self.tx
            .send(line)
            .await
            .map_err(|_| AppError::Io("output sequencer closed".into()))
    }
}

/// Handle to the running writer task.
#[derive(Debug)]
pub struct OutputSequencer {
    complete: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl OutputSequencer {
    /// Start the writer task over `writer`.
    ///
    /// A write failure on the editor stream is transport-fatal: the writer
    /// stops and cancels `shutdown` so the whole proxy winds down.
    pub fn spawn<W>(writer: W, shutdown: CancellationToken) -> (OutputQueue, Self)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        let complete = CancellationToken::new();
        let handle = tokio::spawn(run_output_writer(writer, rx, complete.clone(), shutdown));
        (OutputQueue { tx }, Self { complete, handle })
    }

    /// Mark the queue complete and wait for the writer to drain it.
    ///
    /// # Errors
    ///
    /// Returns the writer's error if the editor stream failed, or
    /// [`AppError::Io`] if the writer task panicked.
    pub async fn finish(self) -> Result<()> {
        self.complete.cancel();
        self.handle
            .await
            .map_err(|err| AppError::Io(format!("output writer task failed: {err}")))?
    }
}

async fn run_output_writer<W>(
    writer: W,
    mut rx: mpsc::Receiver<String>,
    complete: CancellationToken,
    shutdown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(writer, AcpCodec::new());

    let outcome = async {
        loop {
            tokio::select! {
                biased;

                line = rx.recv() => match line {
                    Some(line) => framed.send(line).await?,
                    None => break,
                },

                () = complete.cancelled() => {
                    rx.close();
                    while let Some(line) = rx.recv().await {
                        framed.send(line).await?;
                    }
                    break;
                }
            }
        }
        SinkExt::<String>::flush(&mut framed).await
    }
    .await;

    match outcome {
        Ok(()) => {
            debug!("output writer: drained and stopped");
            Ok(())
        }
        Err(err) => {
            error!(%err, "output writer: editor stream failed");
            shutdown.cancel();
            Err(err)
        }
    }
}
