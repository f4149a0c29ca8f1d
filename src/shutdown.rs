//! Graceful shutdown.
//!
//! The server future is driven until SIGINT/SIGTERM arrives, then given a
//! bounded drain window before it is dropped.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Broadcasts the shutdown trigger to the server.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Creates an untriggered shutdown handle.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once shutdown has been triggered.
    pub fn signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Runs `server` until it finishes or `stop` resolves.
///
/// After `stop` resolves the shutdown handle is triggered and the server gets
/// `timeout` to drain in-flight requests.
pub async fn run_with_graceful_shutdown<F, S, E>(
    server: F,
    shutdown: Shutdown,
    stop: S,
    timeout: Duration,
) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    S: Future<Output = ()>,
{
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            info!("Server stopped");
            return result;
        }
        () = stop => {}
    }

    shutdown.trigger();

    match tokio::time::timeout(timeout, server).await {
        Ok(result) => {
            info!("Shutdown complete");
            result
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Shutdown timeout reached, dropping in-flight requests");
            Ok(())
        }
    }
}
