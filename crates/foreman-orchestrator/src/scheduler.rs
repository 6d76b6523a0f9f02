//! Fixed-interval cycle driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::controller::{Controller, CycleReport};
use crate::error::{OrchestratorError, Result};
use crate::status::ControllerStatus;

/// Runs [`Controller::run_cycle`] immediately and then every `interval`.
///
/// Cycles are awaited inline by a single task, so they never overlap. A
/// shutdown waits for the in-flight cycle to finish.
pub struct CycleScheduler {
    controller: Arc<Mutex<Controller>>,
    status: Arc<RwLock<ControllerStatus>>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    started: bool,
}

impl CycleScheduler {
    pub fn new(controller: Controller, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = controller.status_handle();
        Self {
            controller: Arc::new(Mutex::new(controller)),
            status,
            interval,
            handle: None,
            shutdown_tx,
            shutdown_rx,
            started: false,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(OrchestratorError::AlreadyStarted);
        }
        self.shutdown_tx.send_replace(false);

        let controller = Arc::clone(&self.controller);
        let mut shutdown = self.shutdown_rx.clone();
        let period = self.interval;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        controller.lock().await.run_cycle().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!("cycle scheduler received shutdown signal");
                            break;
                        }
                    }
                }
            }
        }));
        self.started = true;

        info!(interval_secs = self.interval.as_secs(), "cycle scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.started {
            return Err(OrchestratorError::NotStarted);
        }

        self.shutdown_tx.send(true).map_err(|e| {
            OrchestratorError::Shutdown(format!("failed to send shutdown signal: {}", e))
        })?;

        if let Some(handle) = self.handle.take() {
            debug!("waiting for cycle task to stop");
            handle
                .await
                .map_err(|e| OrchestratorError::Shutdown(format!("cycle task panicked: {}", e)))?;
        }
        self.started = false;

        info!("cycle scheduler stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Run one cycle now, waiting for any scheduled cycle in progress.
    pub async fn run_once(&self) -> CycleReport {
        self.controller.lock().await.run_cycle().await
    }

    /// Latest status without waiting on a running cycle.
    pub async fn status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }

    pub fn controller(&self) -> Arc<Mutex<Controller>> {
        Arc::clone(&self.controller)
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        if self.started {
            let _ = self.shutdown_tx.send(true);
        }
    }
}
