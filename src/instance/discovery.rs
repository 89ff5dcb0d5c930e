//! Scans the instance root and materializes valid instances

use super::{Instance, ProcessControl};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Discover every valid instance directly under `root`, in sorted path order.
///
/// Directories missing a required file are skipped, and so are instances that
/// fail to load. A missing root yields an empty list.
pub async fn discover(root: &Path, procs: &dyn ProcessControl) -> Vec<Instance> {
    let candidates = match list_subdirectories(root).await {
        Ok(dirs) => dirs,
        Err(e) => {
            error!(
                "[DISCOVERY] Instance root {} is not readable: {}",
                root.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut instances = Vec::new();
    for dir in candidates {
        if let Some(missing) = Instance::missing_required_files(&dir).first() {
            info!(
                "[DISCOVERY] Not an instance root: missing {} in {}",
                missing,
                dir.display()
            );
            continue;
        }

        match Instance::load(&dir, procs).await {
            Ok(instance) => instances.push(instance),
            Err(e) => error!("[DISCOVERY] Skipping {}: {}", dir.display(), e),
        }
    }

    info!(
        "[DISCOVERY] Found {} instance(s) in {}",
        instances.len(),
        root.display()
    );
    instances
}

async fn list_subdirectories(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut dirs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}
