use actix_web::dev::ServerHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Wait for CTRL+C or SIGTERM (Unix only)
pub async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => {
                result?;
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        info!("Received CTRL+C signal, initiating graceful shutdown...");
    }

    Ok(())
}

/// Handles graceful shutdown of the sandbox service
///
/// Shutdown order:
/// 1. Stop the HTTP server (no new requests)
/// 2. Signal workers to stop claiming jobs
/// 3. Wait for workers to finish their in-flight jobs
/// 4. Wait for the server task to exit
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    worker_handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        worker_handles: Vec<JoinHandle<()>>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            worker_handles,
            shutdown_tx,
        }
    }

    /// Block until a shutdown signal arrives, then shut everything down
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        shutdown_signal().await?;
        self.shutdown().await
    }

    async fn shutdown(self) -> Result<(), std::io::Error> {
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;

        info!("Signaling workers to stop acquiring new jobs...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal to workers: {:?}", e);
        }

        let num_workers = self.worker_handles.len();
        info!("Waiting for {} workers to complete current jobs...", num_workers);
        let mut completed = 0;
        for (i, handle) in self.worker_handles.into_iter().enumerate() {
            match handle.await {
                Ok(_) => {
                    completed += 1;
                    info!("Worker {} stopped ({}/{})", i + 1, completed, num_workers);
                }
                Err(e) => error!("Worker {} failed to stop: {:?}", i + 1, e),
            }
        }
        info!("All workers stopped");

        match self.server_task.await {
            Ok(Ok(_)) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
