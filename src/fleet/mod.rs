//! End-to-end update cycle across every discovered instance

pub mod gate;
pub mod poller;
pub mod progress;

pub use gate::{UpdateGate, UpdateLease};
pub use poller::{StatusPoller, DEFAULT_POLL_INTERVAL};
pub use progress::{
    emit_progress, CycleOutcome, DownloadProgress, ProgressEvent, ProgressSender, UpdateCheck,
    UpdateStage,
};

use crate::artifact::ArtifactCache;
use crate::error::{AppError, AppResult};
use crate::instance::{self, Instance, ProcessControl};
use crate::ledger::UpdateLedger;
use crate::settings::SettingsStore;
use crate::updater::InstanceUpdater;
use crate::upstream::VersionResolver;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct FleetOrchestrator {
    settings: SettingsStore,
    resolver: VersionResolver,
    cache: ArtifactCache,
    updater: InstanceUpdater,
    ledger: UpdateLedger,
    procs: Arc<dyn ProcessControl>,
    gate: UpdateGate,
}

impl FleetOrchestrator {
    pub fn new(
        settings: SettingsStore,
        resolver: VersionResolver,
        cache: ArtifactCache,
        ledger: UpdateLedger,
        procs: Arc<dyn ProcessControl>,
        gate: UpdateGate,
    ) -> Self {
        Self {
            settings,
            resolver,
            cache,
            updater: InstanceUpdater::new(procs.clone()),
            ledger,
            procs,
            gate,
        }
    }

    pub fn gate(&self) -> &UpdateGate {
        &self.gate
    }

    /// Compare the stored version with the latest upstream build
    pub async fn check_for_updates(&self) -> AppResult<UpdateCheck> {
        let settings = self.settings.load().await?;
        let resolved = self.resolver.resolve(&settings.current_version).await;
        let available = resolved.version != settings.current_version;

        if available {
            info!(
                "[FLEET] Newer version detected: {} (was {})",
                resolved.version, settings.current_version
            );
        } else {
            info!("[FLEET] Current version {} is up to date", settings.current_version);
        }

        Ok(UpdateCheck {
            current_version: settings.current_version,
            latest_version: resolved.version,
            available,
        })
    }

    /// Instances under the configured root
    pub async fn discover(&self) -> AppResult<Vec<Instance>> {
        let settings = self.settings.load().await?;
        Ok(instance::discover(&settings.resolved_root, self.procs.as_ref()).await)
    }

    /// Run one full update cycle.
    ///
    /// Any failure is logged once and reported as a single `Error` event.
    pub async fn run_cycle(
        &self,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> AppResult<CycleOutcome> {
        match self.execute_cycle(progress, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("[FLEET] Update cycle failed: {}", e);
                emit_progress(
                    progress,
                    UpdateStage::Error,
                    format!("Update failed: {}", e),
                    0.0,
                );
                Err(e)
            }
        }
    }

    async fn execute_cycle(
        &self,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> AppResult<CycleOutcome> {
        let _lease = self.gate.try_begin().ok_or(AppError::UpdateInProgress)?;

        emit_progress(progress, UpdateStage::Initializing, "Loading configuration...", 0.0);
        let settings = self.settings.load().await?;

        emit_progress(progress, UpdateStage::CheckingVersion, "Checking for updates...", 10.0);
        let resolved = self.resolver.resolve(&settings.current_version).await;

        if resolved.version == settings.current_version {
            info!("[FLEET] No update available");
            emit_progress(progress, UpdateStage::Complete, "No update available", 100.0);
            return Ok(CycleOutcome::NoUpdateAvailable {
                version: resolved.version,
            });
        }

        info!(
            "[FLEET] Newer version detected: {} (was {}), updating settings",
            resolved.version, settings.current_version
        );
        self.settings.update_version(&resolved.version).await?;

        emit_progress(progress, UpdateStage::CheckingVersion, "Discovering instances...", 20.0);
        let mut instances =
            instance::discover(&settings.resolved_root, self.procs.as_ref()).await;
        if instances.is_empty() {
            return Err(AppError::NoInstances(
                settings.resolved_root.display().to_string(),
            ));
        }

        emit_progress(progress, UpdateStage::Downloading, "Downloading update...", 30.0);
        let archive = self
            .cache
            .fetch(&resolved.download_url, &resolved.version, cancel, |p| {
                emit_progress(
                    progress,
                    UpdateStage::Downloading,
                    p.status_message,
                    30.0 + p.percent_complete * 0.4,
                );
            })
            .await?;

        emit_progress(progress, UpdateStage::Extracting, "Extracting files...", 70.0);
        let staged = self.cache.stage(&archive, &resolved.version).await?;

        emit_progress(progress, UpdateStage::UpdatingInstances, "Updating instances...", 70.0);
        let count = instances.len();
        let mut updated_count = 0;
        for (i, instance) in instances.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let percentage = 70 + (i + 1) * 15 / count;
            emit_progress(
                progress,
                UpdateStage::UpdatingInstances,
                format!("Updating {}...", instance.name),
                percentage as f64,
            );

            if self.updater.apply(instance, &staged.staging_path).await? {
                updated_count += 1;
            }

            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
        }

        emit_progress(progress, UpdateStage::Restarting, "Restarting instances...", 85.0);
        for instance in instances.iter_mut() {
            instance.start(self.procs.as_ref()).await?;
            info!("[FLEET] Started instance: {}", instance.name);
        }

        emit_progress(progress, UpdateStage::Complete, "Updating history...", 95.0);
        if let Err(e) = self.ledger.record(&resolved.version).await {
            error!("[FLEET] Failed to record update history: {}", e);
        }

        emit_progress(
            progress,
            UpdateStage::Complete,
            "Update completed successfully!",
            100.0,
        );
        info!(
            "[FLEET] Update cycle completed: {} of {} instance(s) updated to {}",
            updated_count, count, resolved.version
        );

        Ok(CycleOutcome::Updated {
            version: resolved.version,
            instance_count: count,
            updated_count,
        })
    }
}
