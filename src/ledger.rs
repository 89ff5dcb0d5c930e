//! Update history: one entry per applied version

use crate::error::{AppError, AppResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const LEDGER_FILE: &str = "UpdateHistory.json";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerEntry {
    pub version: String,
    pub first_updated_at: String,
    pub last_updated_at: String,
    pub times_updated: u32,
}

pub struct UpdateLedger {
    path: PathBuf,
}

impl UpdateLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that `version` was applied now (local time)
    pub async fn record(&self, version: &str) -> AppResult<()> {
        self.record_at(version, chrono::Local::now().naive_local())
            .await
    }

    /// Merge `version` into the ledger with an explicit timestamp
    pub async fn record_at(&self, version: &str, at: NaiveDateTime) -> AppResult<()> {
        let timestamp = at.format(TIMESTAMP_FORMAT).to_string();
        let mut entries = self.entries().await;

        match entries.iter_mut().find(|e| e.version == version) {
            Some(entry) => {
                entry.times_updated += 1;
                entry.last_updated_at = timestamp;
            }
            None => entries.push(LedgerEntry {
                version: version.to_string(),
                first_updated_at: timestamp.clone(),
                last_updated_at: timestamp,
                times_updated: 1,
            }),
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Io(format!("Failed to create ledger dir: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| AppError::Io(format!("Failed to write update history: {}", e)))?;

        info!("[LEDGER] Recorded version {} in {}", version, self.path.display());
        Ok(())
    }

    /// Current history; empty when the file is missing or unreadable
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Vec::new();
        }

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                error!("[LEDGER] Failed to read {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    "[LEDGER] Failed to parse {}, starting a new history: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }
}
