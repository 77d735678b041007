//! Replay worker with explicit lifecycle management
//!
//! Drives [`RequestExecutor::replay_all`] at process start and whenever the
//! host application reports that connectivity came back, via an injected
//! `watch` channel. Join handles are tracked, cancellation is explicit, and
//! dropping a running worker cancels its task.
//!
//! [`RequestExecutor::replay_all`]: crate::api::RequestExecutor::replay_all

use std::sync::Arc;
use std::time::Duration;

use scorelink_domain::{ClientError, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::RequestExecutor;

/// Configuration for the replay worker.
#[derive(Debug, Clone)]
pub struct ReplayWorkerConfig {
    /// Replay once immediately on start when connectivity is up.
    pub replay_on_start: bool,
    /// Join timeout when stopping.
    pub join_timeout: Duration,
}

impl Default for ReplayWorkerConfig {
    fn default() -> Self {
        Self { replay_on_start: true, join_timeout: Duration::from_secs(5) }
    }
}

/// Background task replaying the durable retry queue.
pub struct ReplayWorker {
    executor: Arc<RequestExecutor>,
    connectivity: watch::Receiver<bool>,
    config: ReplayWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ReplayWorker {
    /// Create a worker watching the given connectivity signal.
    ///
    /// `true` on the channel means the network is reachable; replay fires
    /// on every transition to `true`.
    pub fn new(
        executor: Arc<RequestExecutor>,
        connectivity: watch::Receiver<bool>,
        config: ReplayWorkerConfig,
    ) -> Self {
        Self {
            executor,
            connectivity,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the background task.
    ///
    /// # Errors
    /// Returns an error if the worker is already running.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ClientError::Internal("replay worker already running".into()));
        }

        info!("starting replay worker");
        self.cancellation = CancellationToken::new();

        let executor = Arc::clone(&self.executor);
        let connectivity = self.connectivity.clone();
        let replay_on_start = self.config.replay_on_start;
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(executor, connectivity, replay_on_start, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for its task to finish.
    ///
    /// # Errors
    /// Returns an error if the worker is not running, or if the task
    /// panicked or failed to stop within the join timeout.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(ClientError::Internal("replay worker not running".into()));
        }

        info!("stopping replay worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "replay worker task panicked");
                    return Err(ClientError::Internal("replay worker task panicked".into()));
                }
                Err(_) => {
                    warn!("replay worker did not stop within the join timeout");
                    return Err(ClientError::Internal("replay worker join timeout".into()));
                }
            }
        }

        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true while a worker task is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn process_loop(
        executor: Arc<RequestExecutor>,
        mut connectivity: watch::Receiver<bool>,
        replay_on_start: bool,
        cancel: CancellationToken,
    ) {
        if replay_on_start && *connectivity.borrow_and_update() {
            executor.replay_all().await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("replay worker loop cancelled");
                    break;
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        // The connectivity source is gone; nothing left to
                        // react to, so just wait for shutdown.
                        debug!("connectivity source dropped; replay worker idle");
                        cancel.cancelled().await;
                        break;
                    }
                    if *connectivity.borrow_and_update() {
                        info!("connectivity recovered; replaying queued requests");
                        executor.replay_all().await;
                    }
                }
            }
        }
    }
}

impl Drop for ReplayWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("replay worker dropped while running; cancelling its task");
            self.cancellation.cancel();
        }
    }
}
