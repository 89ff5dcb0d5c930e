use crate::artifact::ArtifactCache;
use crate::fleet::{FleetOrchestrator, StatusPoller, UpdateGate};
use crate::instance::{ProcessControl, SystemProcesses};
use crate::ledger::{UpdateLedger, LEDGER_FILE};
use crate::settings::SettingsStore;
use crate::upstream::VersionResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const LOG_DIR_NAME: &str = "Logs";

pub struct AppState {
    pub http_client: reqwest::Client,
    pub settings_path: PathBuf,
    pub log_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub procs: Arc<dyn ProcessControl>,
    pub gate: UpdateGate,
}

impl AppState {
    pub fn new(
        settings_path: impl Into<PathBuf>,
        log_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let settings_path = settings_path.into();
        let log_dir = log_dir.unwrap_or_else(|| Self::default_log_dir(&settings_path));

        // No overall timeout: archive downloads can take minutes
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("BedrockFleet/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            settings_path,
            log_dir,
            cache_dir: ArtifactCache::default_dir(),
            procs: Arc::new(SystemProcesses::new()),
            gate: UpdateGate::new(),
        })
    }

    /// `Logs/` next to the settings file
    pub fn default_log_dir(settings_path: &Path) -> PathBuf {
        settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(LOG_DIR_NAME)
    }

    pub fn settings_store(&self) -> SettingsStore {
        SettingsStore::new(&self.settings_path)
    }

    pub fn ledger(&self) -> UpdateLedger {
        UpdateLedger::new(self.log_dir.join(LEDGER_FILE))
    }

    pub fn orchestrator(&self) -> FleetOrchestrator {
        FleetOrchestrator::new(
            self.settings_store(),
            VersionResolver::new(self.http_client.clone()),
            ArtifactCache::new(self.http_client.clone(), &self.cache_dir),
            self.ledger(),
            self.procs.clone(),
            self.gate.clone(),
        )
    }

    pub fn status_poller(&self, interval: Duration) -> StatusPoller {
        StatusPoller::new(self.procs.clone(), self.gate.clone(), interval)
    }
}
