//! Editor input loop and proxy-wide shutdown.

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{error, info, warn};

use super::Dispatcher;
use crate::acp::codec::AcpCodec;
use crate::{AppError, Result};

impl Dispatcher {
    /// Read editor lines until EOF or cancellation, dispatching each in
    /// arrival order, then terminate every session.
    ///
    /// # Errors
    ///
    /// Returns an error when the editor stream fails (read error, or the
    /// output sequencer stopped). EOF and cancellation are normal completion.
    pub async fn run<R>(&self, input: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut lines = FramedRead::new(input, AcpCodec::new());

        let outcome = loop {
            let next = tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("dispatcher: shutdown requested");
                    break Ok(());
                }

                next = lines.next() => next,
            };

            match next {
                None => {
                    info!("dispatcher: editor closed input");
                    break Ok(());
                }
                Some(Err(AppError::Acp(reason))) => {
                    warn!(%reason, "dispatcher: skipping unreadable editor line");
                }
                Some(Err(e)) => {
                    error!(error = %e, "dispatcher: editor input failed");
                    break Err(e);
                }
                Some(Ok(line)) => {
                    if let Err(e) = self.handle_line(&line).await {
                        error!(error = %e, "dispatcher: editor output failed");
                        break Err(e);
                    }
                }
            }
        };

        self.shutdown.cancel();
        self.shutdown_all().await;
        outcome
    }

    /// Terminate every registered session concurrently, each bounded by the
    /// shutdown drain.
    pub async fn shutdown_all(&self) {
        let sessions = self.registry.drain().await;
        if sessions.is_empty() {
            return;
        }
        info!(count = sessions.len(), "terminating all sessions");
        let drain = self.settings.timeouts.shutdown_drain;
        join_all(sessions.iter().map(|session| session.terminate(drain))).await;
    }
}
