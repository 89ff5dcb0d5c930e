//! Applies a staged release to one instance while keeping its config files

use crate::error::{AppError, AppResult};
use crate::instance::{Instance, ProcessControl, CONFIG_FILES};
use crate::marker::{self, UNKNOWN_VERSION};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Per-instance directory holding the last config backup
pub const BACKUP_DIR: &str = "BACKUP";

pub struct InstanceUpdater {
    procs: Arc<dyn ProcessControl>,
}

impl InstanceUpdater {
    pub fn new(procs: Arc<dyn ProcessControl>) -> Self {
        Self { procs }
    }

    /// True unless the instance marker reads exactly `target`
    pub async fn needs_update(&self, instance: &Instance, target: &str) -> bool {
        match marker::read_marker(&instance.root_path).await {
            Ok(Some(version)) if version == target => {
                debug!("[UPDATE] No update needed for {}", instance.name);
                false
            }
            Ok(Some(_)) => true,
            Ok(None) => {
                info!(
                    "[UPDATE] No version marker for {}, performing update",
                    instance.name
                );
                true
            }
            Err(e) => {
                warn!(
                    "[UPDATE] Failed to read version for {}, will update: {}",
                    instance.name, e
                );
                true
            }
        }
    }

    /// Stop, back up configs, copy the staged tree, restore configs.
    ///
    /// Returns false when the instance already runs the staged version.
    pub async fn apply(&self, instance: &mut Instance, staging_path: &Path) -> AppResult<bool> {
        let target = marker::read_marker(staging_path)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        if !self.needs_update(instance, &target).await {
            return Ok(false);
        }

        info!(
            "[UPDATE] Updating {} at {} to {}",
            instance.name,
            instance.root_path.display(),
            target
        );

        instance.refresh_status(self.procs.as_ref());
        if instance.is_running {
            instance.stop(self.procs.as_ref()).await?;
        }

        backup_config_files(&instance.root_path).await?;

        let src = staging_path.to_path_buf();
        let dst = instance.root_path.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
            .await
            .map_err(|e| AppError::Io(format!("Copy task failed: {}", e)))??;
        debug!("[UPDATE] Copied {} file(s) into {}", copied, instance.name);

        restore_config_files(&instance.root_path).await?;

        instance.installed_version = target;
        info!("[UPDATE] Update applied to {}", instance.name);

        Ok(true)
    }
}

async fn backup_config_files(root: &Path) -> AppResult<()> {
    let backup_dir = root.join(BACKUP_DIR);
    tokio::fs::create_dir_all(&backup_dir)
        .await
        .map_err(|e| AppError::Io(format!("Failed to create backup dir: {}", e)))?;

    for file in CONFIG_FILES {
        let source = root.join(file);
        if tokio::fs::try_exists(&source).await.unwrap_or(false) {
            tokio::fs::copy(&source, backup_dir.join(file))
                .await
                .map_err(|e| AppError::Io(format!("Failed to back up {}: {}", file, e)))?;
        }
    }

    Ok(())
}

async fn restore_config_files(root: &Path) -> AppResult<()> {
    let backup_dir = root.join(BACKUP_DIR);
    if !tokio::fs::try_exists(&backup_dir).await.unwrap_or(false) {
        return Ok(());
    }

    for file in CONFIG_FILES {
        let backup = backup_dir.join(file);
        if tokio::fs::try_exists(&backup).await.unwrap_or(false) {
            tokio::fs::copy(&backup, root.join(file))
                .await
                .map_err(|e| AppError::Io(format!("Failed to restore {}: {}", file, e)))?;
        }
    }

    Ok(())
}

/// Overwrite-copy every file under `src` into `dst`, returning the file count
fn copy_tree(src: &Path, dst: &Path) -> AppResult<u64> {
    if !src.is_dir() {
        return Err(AppError::Io(format!(
            "Staging directory not found: {}",
            src.display()
        )));
    }

    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry =
            entry.map_err(|e| AppError::Io(format!("Failed to walk staging dir: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| AppError::Io(format!("Invalid staged path: {}", e)))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| AppError::Io(format!("Failed to create directory: {}", e)))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| {
                AppError::Io(format!("Failed to copy {}: {}", relative.display(), e))
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}
