//! Graceful shutdown.
//!
//! One broadcast channel fans a stop signal out to the matchmaker, the
//! sweep scheduler, the metrics loop and the servers.

use tokio::sync::broadcast;

pub struct ShutdownController {
    signal: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (signal, _) = broadcast::channel(1);
        Self { signal }
    }

    /// A receiver that fires once shutdown begins. Subscribe before
    /// spawning the task that waits on it.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.signal.subscribe()
    }

    pub fn shutdown(&self) {
        // No subscribers simply means nothing is running yet.
        let _ = self.signal.send(());
    }

    /// Block until the process is asked to stop, then broadcast shutdown.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::info!(signal = "SIGINT", "stop requested"),
                Err(e) => tracing::warn!(error = %e, "could not listen for SIGINT"),
            },
            _ = sigterm() => tracing::info!(signal = "SIGTERM", "stop requested"),
        }
        self.shutdown();
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
