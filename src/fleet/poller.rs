//! Periodic running-status refresh, paused while an update holds the gate

use super::gate::UpdateGate;
use crate::instance::{Instance, ProcessControl};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct StatusPoller {
    procs: Arc<dyn ProcessControl>,
    gate: UpdateGate,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(procs: Arc<dyn ProcessControl>, gate: UpdateGate, interval: Duration) -> Self {
        Self {
            procs,
            gate,
            interval,
        }
    }

    /// Refresh every instance once. Returns false if skipped because an update is running.
    pub async fn tick(&self, instances: &RwLock<Vec<Instance>>) -> bool {
        if self.gate.is_active() {
            debug!("[POLLER] Update in progress, skipping status refresh");
            return false;
        }

        let mut guard = instances.write().await;
        for instance in guard.iter_mut() {
            let was_running = instance.is_running;
            instance.refresh_status(self.procs.as_ref());
            if was_running != instance.is_running {
                info!(
                    "[POLLER] {} is now {}",
                    instance.name,
                    if instance.is_running { "running" } else { "stopped" }
                );
            }
        }
        true
    }

    /// Run `tick` every interval until `shutdown` fires
    pub fn spawn(
        self,
        instances: Arc<RwLock<Vec<Instance>>>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick(&instances).await;
                    }
                }
            }
            debug!("[POLLER] Stopped");
        })
    }
}
