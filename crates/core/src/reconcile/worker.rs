//! Background worker hosting the reconciliation loop.
//!
//! Join handles are tracked, cancellation is explicit, and stopping waits for
//! the loop with a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use tally_domain::constants::WORKER_JOIN_TIMEOUT_MS;
use tally_domain::{Result, TallyError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::service::ReconcileService;

/// Reconciliation worker with explicit lifecycle management.
pub struct ReconcileWorker {
    service: Arc<ReconcileService>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl ReconcileWorker {
    pub fn new(service: Arc<ReconcileService>) -> Self {
        Self {
            service,
            cancellation: CancellationToken::new(),
            task_handle: None,
            join_timeout: Duration::from_millis(WORKER_JOIN_TIMEOUT_MS),
        }
    }

    /// Override how long [`stop`](Self::stop) waits for the loop
    #[must_use]
    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    /// Start the worker, spawning the reconciliation loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `TallyError::InvalidInput` if the worker is already running.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(TallyError::InvalidInput("Worker already running".to_string()));
        }

        info!(
            poll_interval_ms = self.service.poll_interval().as_millis() as u64,
            "Starting reconciliation worker"
        );

        // Create fresh cancellation token
        self.cancellation = CancellationToken::new();

        let service = Arc::clone(&self.service);
        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            service.run(cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for the loop to finish.
    ///
    /// # Errors
    /// Returns an error if the worker is not running, the loop panicked, or
    /// it did not finish within the join timeout.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(TallyError::InvalidInput("Worker not running".to_string()));
        };

        info!("Stopping reconciliation worker");
        self.cancellation.cancel();

        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Worker task panicked");
                return Err(TallyError::Internal("Worker task panicked".to_string()));
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "Worker task did not complete within timeout"
                );
                return Err(TallyError::Internal("Worker task timeout".to_string()));
            }
        }

        info!("Reconciliation worker stopped");
        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Whether the spawned loop has returned on its own
    pub fn is_finished(&self) -> bool {
        self.task_handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

impl Drop for ReconcileWorker {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            self.cancellation.cancel();
        }
    }
}
