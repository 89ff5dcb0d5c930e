//! Settings record: fleet-wide version and instance root

use crate::error::{AppError, AppResult};
use crate::instance::normalize_path;
use crate::marker::UNKNOWN_VERSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const DEFAULT_SETTINGS_FILE: &str = "configuration.json";
pub const DEFAULT_INSTANCE_ROOT: &str = "../TheServers";

fn default_version() -> String {
    UNKNOWN_VERSION.to_string()
}

fn default_instance_root() -> String {
    DEFAULT_INSTANCE_ROOT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_version", alias = "currentMinecraftVersion")]
    pub current_version: String,

    /// As written in the file; may be relative to the settings file
    #[serde(default = "default_instance_root", alias = "serverRoot")]
    pub instance_root: String,

    /// `instance_root` resolved against the settings file's directory
    #[serde(skip)]
    pub resolved_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            current_version: default_version(),
            instance_root: default_instance_root(),
            resolved_root: PathBuf::from(DEFAULT_INSTANCE_ROOT),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the settings file
    pub async fn load(&self) -> AppResult<Settings> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            error!("[SETTINGS] Settings file not found at {}", self.path.display());
            return Err(AppError::Config(format!(
                "Settings file not found at {}",
                self.path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AppError::Config(format!("Failed to read settings: {}", e)))?;
        let mut settings: Settings = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse settings: {}", e)))?;

        if settings.current_version.trim().is_empty() {
            return Err(AppError::Config(
                "Missing 'currentVersion' in settings".to_string(),
            ));
        }

        settings.resolved_root = self.resolve_root(&settings.instance_root)?;

        info!(
            "[SETTINGS] Loaded: version={}, root={}",
            settings.current_version,
            settings.resolved_root.display()
        );
        Ok(settings)
    }

    pub async fn save(&self, settings: &Settings) -> AppResult<()> {
        let json = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| AppError::Config(format!("Failed to save settings: {}", e)))?;

        info!("[SETTINGS] Saved: version={}", settings.current_version);
        Ok(())
    }

    /// Reload, replace the version, save
    pub async fn update_version(&self, version: &str) -> AppResult<Settings> {
        let mut settings = self.load().await?;
        settings.current_version = version.to_string();
        self.save(&settings).await?;
        Ok(settings)
    }

    fn resolve_root(&self, raw: &str) -> AppResult<PathBuf> {
        let root = Path::new(raw);
        let joined = if root.is_absolute() {
            root.to_path_buf()
        } else {
            let base = self
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            base.join(root)
        };

        normalize_path(&joined)
            .map_err(|e| AppError::Config(format!("Invalid instance root {}: {}", raw, e)))
    }
}
