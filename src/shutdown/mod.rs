// Package shutdown turns OS signals into cancellation of the process-wide
// token every in-flight start is parented to.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded")]
pub struct TimeoutError;

#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_token: CancellationToken,
    timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            shutdown_token,
            timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }

    /// Waits for SIGINT (or an external cancel) and cancels the token.
    pub async fn await_signal(&self) {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(
                    component = "graceful-shutdown",
                    event = "os_signal",
                    signal = "SIGINT",
                    "cancellation started"
                );
            }
            _ = self.shutdown_token.cancelled() => {
                info!(
                    component = "graceful-shutdown",
                    event = "ctx_done",
                    "cancellation started"
                );
            }
        }
        self.shutdown_token.cancel();
    }

    /// Listens for the signal in the background.
    pub fn spawn_listener(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.await_signal().await })
    }

    /// Runs cleanup work after cancellation, bounded by the graceful timeout.
    pub async fn bounded<F: Future>(&self, work: F) -> Result<F::Output, TimeoutError> {
        match timeout(self.timeout, work).await {
            Ok(out) => {
                info!(
                    component = "graceful-shutdown",
                    event = "shutdown_success",
                    "cleanup finished"
                );
                Ok(out)
            }
            Err(_) => {
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "cleanup did not finish within timeout"
                );
                Err(TimeoutError)
            }
        }
    }
}
