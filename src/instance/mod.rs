//! Server instance model
//! One instance is one self-contained server installation directory

pub mod discovery;
pub mod process;
pub mod properties;

pub use discovery::discover;
pub use process::{paths_match, ProcessControl, SystemProcesses};
pub use properties::ServerProperties;

use crate::error::{AppError, AppResult};
use crate::marker::{self, UNKNOWN_VERSION};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Server executable shipped in the upstream archive
#[cfg(target_os = "windows")]
pub const EXECUTABLE_NAME: &str = "bedrock_server.exe";
#[cfg(not(target_os = "windows"))]
pub const EXECUTABLE_NAME: &str = "bedrock_server";

pub const PROPERTIES_FILE: &str = "server.properties";
pub const ALLOWLIST_FILE: &str = "allowlist.json";
pub const PERMISSIONS_FILE: &str = "permissions.json";

/// Files that make a directory an instance
pub const REQUIRED_FILES: &[&str] = &[
    EXECUTABLE_NAME,
    PERMISSIONS_FILE,
    ALLOWLIST_FILE,
    PROPERTIES_FILE,
];

/// Files tuned per instance; never taken from the upstream archive
pub const CONFIG_FILES: &[&str] = &[PROPERTIES_FILE, ALLOWLIST_FILE, PERMISSIONS_FILE];

/// How long `stop` waits for a terminated process to disappear
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Instance {
    pub root_path: PathBuf,
    pub name: String,
    pub properties: ServerProperties,
    pub installed_version: String,
    pub is_running: bool,
    pub process_id: Option<u32>,
}

impl Instance {
    /// Build an instance from a validated directory: properties, version marker, live status
    pub async fn load(root: &Path, procs: &dyn ProcessControl) -> AppResult<Self> {
        let root_path = normalize_path(root).map_err(|e| {
            AppError::Instance(format!("Failed to resolve {}: {}", root.display(), e))
        })?;
        let name = root_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                AppError::Instance(format!("Invalid instance path: {}", root_path.display()))
            })?;

        let mut instance = Self {
            root_path,
            name,
            properties: ServerProperties::default(),
            installed_version: UNKNOWN_VERSION.to_string(),
            is_running: false,
            process_id: None,
        };

        instance.load_properties().await;
        instance.installed_version = marker::read_marker_or_unknown(&instance.root_path).await;
        instance.refresh_status(procs);

        Ok(instance)
    }

    async fn load_properties(&mut self) {
        let path = self.properties_path();
        match ServerProperties::load(&path).await {
            Ok(props) => self.properties = props,
            Err(e) => warn!("[INSTANCE] {}: properties left empty: {}", self.name, e),
        }
    }

    pub fn executable_path(&self) -> PathBuf {
        self.root_path.join(EXECUTABLE_NAME)
    }

    pub fn properties_path(&self) -> PathBuf {
        self.root_path.join(PROPERTIES_FILE)
    }

    /// Required files missing from `dir`, in check order
    pub fn missing_required_files(dir: &Path) -> Vec<&'static str> {
        REQUIRED_FILES
            .iter()
            .copied()
            .filter(|file| !dir.join(file).is_file())
            .collect()
    }

    pub fn validate_required_files(&self) -> bool {
        Self::missing_required_files(&self.root_path).is_empty()
    }

    /// Recompute running state from the live process table
    pub fn refresh_status(&mut self, procs: &dyn ProcessControl) {
        let pids = procs.list_running_instances_of(&self.executable_path());
        self.process_id = pids.first().copied();
        self.is_running = self.process_id.is_some();
    }

    /// Launch the server executable. Does nothing when already running.
    pub async fn start(&mut self, procs: &dyn ProcessControl) -> AppResult<()> {
        if self.is_running {
            debug!("[INSTANCE] {} already running (pid {:?})", self.name, self.process_id);
            return Ok(());
        }

        let exe = self.executable_path();
        if !tokio::fs::try_exists(&exe).await.unwrap_or(false) {
            return Err(AppError::Instance(format!(
                "{} not found in {}",
                EXECUTABLE_NAME,
                self.root_path.display()
            )));
        }

        let pid = procs.launch(&exe, &self.root_path)?;
        self.process_id = Some(pid);
        self.is_running = true;
        info!("[INSTANCE] Started {} (pid {})", self.name, pid);

        Ok(())
    }

    /// Terminate every process running this instance's executable
    pub async fn stop(&mut self, procs: &dyn ProcessControl) -> AppResult<()> {
        let exe = self.executable_path();

        for pid in procs.list_running_instances_of(&exe) {
            if !procs.terminate(pid) {
                warn!("[INSTANCE] Could not signal pid {} of {}", pid, self.name);
                continue;
            }

            let deadline = tokio::time::Instant::now() + STOP_TIMEOUT;
            while procs.list_running_instances_of(&exe).contains(&pid) {
                if tokio::time::Instant::now() >= deadline {
                    warn!(
                        "[INSTANCE] pid {} of {} still alive after {}s",
                        pid,
                        self.name,
                        STOP_TIMEOUT.as_secs()
                    );
                    break;
                }
                tokio::time::sleep(STOP_POLL_INTERVAL).await;
            }
            info!("[INSTANCE] Stopped {} (pid {})", self.name, pid);
        }

        self.is_running = false;
        self.process_id = None;

        Ok(())
    }

    pub fn full_description(&self) -> String {
        format!(
            "{} [Version: {}] [{}] Port:{}, v6:{}",
            self,
            self.installed_version,
            self.root_path.display(),
            self.properties.server_port(),
            self.properties.server_port_v6()
        )
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.name,
            self.properties.gamemode().unwrap_or_default()
        )
    }
}

/// Absolute form of `path` with `.` and `..` folded away lexically.
///
/// Process tables report executables by their plain absolute path, so an
/// instance root must not keep `..` segments or it never matches.
pub fn normalize_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();

    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    Ok(normalized)
}

/// Create a complete instance directory for tests
#[cfg(test)]
pub(crate) fn write_test_instance(dir: &Path, version: Option<&str>) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(EXECUTABLE_NAME), b"binary").unwrap();
    std::fs::write(
        dir.join(PROPERTIES_FILE),
        "server-name=Tuned\ngamemode=creative\nserver-port=19140\n",
    )
    .unwrap();
    std::fs::write(dir.join(ALLOWLIST_FILE), r#"[{"name":"steve"}]"#).unwrap();
    std::fs::write(dir.join(PERMISSIONS_FILE), r#"[{"permission":"operator"}]"#).unwrap();
    if let Some(version) = version {
        std::fs::write(
            dir.join(marker::MARKER_FILE),
            format!(r#"{{"Version":"{}"}}"#, version),
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProcesses;

    #[tokio::test]
    async fn test_load_instance() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("alpha");
        write_test_instance(&dir, Some("1.21.0"));

        let procs = FakeProcesses::default();
        let instance = Instance::load(&dir, &procs).await.unwrap();

        assert_eq!(instance.name, "alpha");
        assert_eq!(instance.installed_version, "1.21.0");
        assert_eq!(instance.properties.server_port(), 19140);
        assert!(!instance.is_running);
        assert!(instance.validate_required_files());
        assert_eq!(instance.to_string(), "alpha creative");
        assert!(instance.full_description().contains("Port:19140, v6:19133"));
    }

    #[tokio::test]
    async fn test_unknown_version_without_marker() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("beta");
        write_test_instance(&dir, None);

        let instance = Instance::load(&dir, &FakeProcesses::default()).await.unwrap();
        assert_eq!(instance.installed_version, UNKNOWN_VERSION);
    }

    #[tokio::test]
    async fn test_status_matches_executable_path() {
        let root = tempfile::tempdir().unwrap();
        let alpha = root.path().join("alpha");
        let beta = root.path().join("beta");
        write_test_instance(&alpha, None);
        write_test_instance(&beta, None);

        let procs = FakeProcesses::with_running(&alpha.join(EXECUTABLE_NAME));

        let a = Instance::load(&alpha, &procs).await.unwrap();
        let b = Instance::load(&beta, &procs).await.unwrap();
        assert!(a.is_running);
        assert!(a.process_id.is_some());
        assert!(!b.is_running);
    }

    #[test]
    fn test_normalize_path_folds_parent_segments() {
        let root = tempfile::tempdir().unwrap();
        let messy = root.path().join("app/./../servers");

        let normalized = normalize_path(&messy).unwrap();
        assert_eq!(normalized, root.path().join("servers"));
        assert!(!normalized
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir)));
    }

    #[tokio::test]
    async fn test_status_detected_through_parent_segments() {
        let root = tempfile::tempdir().unwrap();
        let alpha = root.path().join("servers").join("alpha");
        write_test_instance(&alpha, None);
        std::fs::create_dir_all(root.path().join("app")).unwrap();

        let procs = FakeProcesses::with_running(&alpha.join(EXECUTABLE_NAME));
        let via_parent = root.path().join("app/../servers/alpha");

        let instance = Instance::load(&via_parent, &procs).await.unwrap();
        assert_eq!(instance.root_path, alpha);
        assert!(instance.is_running);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("alpha");
        write_test_instance(&dir, None);

        let procs = FakeProcesses::default();
        let mut instance = Instance::load(&dir, &procs).await.unwrap();

        instance.start(&procs).await.unwrap();
        assert!(instance.is_running);
        // Second start is a no-op
        instance.start(&procs).await.unwrap();
        assert_eq!(procs.count(), 1);

        instance.stop(&procs).await.unwrap();
        assert!(!instance.is_running);
        assert_eq!(procs.count(), 0);
    }

    #[tokio::test]
    async fn test_start_without_executable_fails() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("alpha");
        write_test_instance(&dir, None);

        let procs = FakeProcesses::default();
        let mut instance = Instance::load(&dir, &procs).await.unwrap();
        std::fs::remove_file(dir.join(EXECUTABLE_NAME)).unwrap();

        assert!(matches!(
            instance.start(&procs).await,
            Err(AppError::Instance(_))
        ));
    }
}
