use serde::Serialize;
use tokio::sync::mpsc;

pub use crate::artifact::DownloadProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateStage {
    Initializing,
    CheckingVersion,
    Downloading,
    Extracting,
    UpdatingInstances,
    Restarting,
    Complete,
    Error,
}

/// Progress event emitted during an update cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: UpdateStage,
    pub message: String,
    pub percentage: f64,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Emit a progress event if an observer is attached
pub fn emit_progress(
    progress: Option<&ProgressSender>,
    stage: UpdateStage,
    message: impl Into<String>,
    percentage: f64,
) {
    if let Some(tx) = progress {
        let _ = tx.send(ProgressEvent {
            stage,
            message: message.into(),
            percentage: percentage.clamp(0.0, 100.0),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoUpdateAvailable {
        version: String,
    },
    Updated {
        version: String,
        instance_count: usize,
        updated_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub current_version: String,
    pub latest_version: String,
    pub available: bool,
}
