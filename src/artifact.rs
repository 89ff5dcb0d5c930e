//! Release archive cache: download once per version, extract once per version

use crate::error::{AppError, AppResult};
use crate::instance::CONFIG_FILES;
use crate::marker;
use futures_util::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CACHE_DIR_NAME: &str = "MinecraftBedrockUpdate";
const STAGING_DIR_NAME: &str = "extracted";
const WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// One tick of download progress
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub bytes_received: u64,
    /// None when the server sent no content length
    pub total_bytes: Option<u64>,
    pub percent_complete: f64,
    pub bytes_per_second: f64,
    pub eta: Duration,
    pub status_message: String,
}

impl DownloadProgress {
    pub fn compute(bytes_received: u64, total_bytes: Option<u64>, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let bytes_per_second = if secs > 0.0 {
            bytes_received as f64 / secs
        } else {
            0.0
        };

        let total = total_bytes.filter(|t| *t > 0);
        let percent_complete = total
            .map(|t| (bytes_received as f64 / t as f64 * 100.0).min(100.0))
            .unwrap_or(0.0);
        let eta = match total {
            Some(t) if bytes_per_second > 0.0 && t > bytes_received => {
                Duration::from_secs_f64((t - bytes_received) as f64 / bytes_per_second)
            }
            _ => Duration::ZERO,
        };

        Self {
            bytes_received,
            total_bytes,
            percent_complete,
            bytes_per_second,
            eta,
            status_message: format!(
                "Downloading: {} MB / {} MB",
                bytes_received / 1024 / 1024,
                total_bytes.unwrap_or(0) / 1024 / 1024
            ),
        }
    }
}

/// Extracted release tree ready to be copied into instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub staging_path: PathBuf,
    pub version: String,
}

pub struct ArtifactCache {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(client: reqwest::Client, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// `<system temp>/MinecraftBedrockUpdate`
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join(CACHE_DIR_NAME)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.cache_dir.join(format!("bedrock-server-{}.zip", version))
    }

    pub fn staging_path(&self) -> PathBuf {
        self.cache_dir.join(STAGING_DIR_NAME)
    }

    /// Download the archive for `version` unless it is already cached.
    ///
    /// The body is written to a `.part` sibling and only renamed onto the
    /// archive path once complete. Cancellation leaves the `.part` file behind.
    pub async fn fetch<F>(
        &self,
        url: &str,
        version: &str,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> AppResult<PathBuf>
    where
        F: FnMut(DownloadProgress),
    {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| AppError::Io(format!("Failed to create cache dir: {}", e)))?;

        let target = self.archive_path(version);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            info!("[ARTIFACT] Archive already downloaded: {}", target.display());
            return Ok(target);
        }

        info!("[ARTIFACT] Downloading {} to {}", url, target.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Failed to download: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let total_bytes = response.content_length();
        let part_path = part_path_for(&target);
        let file = tokio::fs::File::create(&part_path)
            .await
            .map_err(|e| AppError::Io(format!("Failed to create {}: {}", part_path.display(), e)))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let started = Instant::now();
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = writer.flush().await;
                    warn!("[ARTIFACT] Download cancelled after {} bytes", received);
                    return Err(AppError::Cancelled);
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else { break };
            let chunk =
                chunk.map_err(|e| AppError::Network(format!("Failed to read response: {}", e)))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Io(format!("Failed to write archive: {}", e)))?;
            received += chunk.len() as u64;

            on_progress(DownloadProgress::compute(
                received,
                total_bytes,
                started.elapsed(),
            ));
        }

        writer
            .flush()
            .await
            .map_err(|e| AppError::Io(format!("Failed to flush archive: {}", e)))?;
        drop(writer);

        tokio::fs::rename(&part_path, &target)
            .await
            .map_err(|e| AppError::Io(format!("Failed to finalize archive: {}", e)))?;

        info!(
            "[ARTIFACT] Download completed: {} ({} bytes)",
            target.display(),
            received
        );
        Ok(target)
    }

    /// Extract `archive` into the staging directory unless it already holds `version`
    pub async fn stage(&self, archive: &Path, version: &str) -> AppResult<StagedArtifact> {
        let staging_path = self.staging_path();

        match marker::read_marker(&staging_path).await {
            Ok(Some(staged)) if staged == version => {
                info!(
                    "[ARTIFACT] Staging already contains version {}, skipping extraction",
                    version
                );
                return Ok(StagedArtifact {
                    staging_path,
                    version: version.to_string(),
                });
            }
            Ok(Some(staged)) => {
                info!("[ARTIFACT] Staged version {} differs, re-extracting", staged)
            }
            Ok(None) => {}
            Err(e) => warn!("[ARTIFACT] Unreadable staging marker, re-extracting: {}", e),
        }

        if tokio::fs::try_exists(&staging_path).await.unwrap_or(false) {
            debug!("[ARTIFACT] Removing stale staging directory");
            tokio::fs::remove_dir_all(&staging_path)
                .await
                .map_err(|e| AppError::Io(format!("Failed to clean staging dir: {}", e)))?;
        }
        tokio::fs::create_dir_all(&staging_path)
            .await
            .map_err(|e| AppError::Io(format!("Failed to create staging dir: {}", e)))?;

        info!("[ARTIFACT] Extracting {} to {}", archive.display(), staging_path.display());
        let archive_owned = archive.to_path_buf();
        let staging_owned = staging_path.clone();
        tokio::task::spawn_blocking(move || extract_archive(&archive_owned, &staging_owned))
            .await
            .map_err(|e| AppError::Archive(format!("Extraction task failed: {}", e)))??;

        for file in CONFIG_FILES {
            let path = staging_path.join(file);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| AppError::Io(format!("Failed to remove staged {}: {}", file, e)))?;
            }
        }

        marker::write_marker(&staging_path, version).await?;

        Ok(StagedArtifact {
            staging_path,
            version: version.to_string(),
        })
    }
}

fn part_path_for(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Extract every entry whose name stays inside `dest`
fn extract_archive(archive_path: &Path, dest: &Path) -> AppResult<()> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| AppError::Io(format!("Failed to open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| AppError::Archive(format!("Failed to read ZIP: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| AppError::Archive(format!("Failed to read ZIP entry: {}", e)))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!("[ARTIFACT] Skipping unsafe entry {}", entry.name());
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .map_err(|e| AppError::Io(format!("Failed to create directory: {}", e)))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Io(format!("Failed to create parent dir: {}", e)))?;
            }
            let mut outfile = std::fs::File::create(&outpath)
                .map_err(|e| AppError::Io(format!("Failed to create file: {}", e)))?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| AppError::Io(format!("Failed to extract file: {}", e)))?;
        }
    }

    Ok(())
}
