//! OS process capability used by instance start/stop and status checks
//!
//! Several instances share the same executable *name*, so processes are told
//! apart by their full executable path.

use crate::error::{AppError, AppResult};
use std::path::Path;
use std::process::Stdio;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

// Windows-specific: CREATE_NEW_CONSOLE flag gives each server its own console window
#[cfg(target_os = "windows")]
const CREATE_NEW_CONSOLE: u32 = 0x00000010;

pub trait ProcessControl: Send + Sync {
    /// Ids of live processes whose executable is `executable`
    fn list_running_instances_of(&self, executable: &Path) -> Vec<u32>;

    /// Ask the OS to terminate `pid`. Returns false if the signal could not be delivered.
    fn terminate(&self, pid: u32) -> bool;

    /// Launch `executable` with `working_dir` as its current directory, returning the pid
    fn launch(&self, executable: &Path, working_dir: &Path) -> AppResult<u32>;
}

/// Case-insensitive full-path comparison
pub fn paths_match(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

/// [`ProcessControl`] backed by the live process table
#[derive(Debug, Default)]
pub struct SystemProcesses;

impl SystemProcesses {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> System {
        let mut sys = System::new();
        let refresh_kind = ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet);
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind);
        sys
    }
}

impl ProcessControl for SystemProcesses {
    fn list_running_instances_of(&self, executable: &Path) -> Vec<u32> {
        let sys = Self::snapshot();
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter(|(_, process)| {
                process
                    .exe()
                    .map(|exe| paths_match(exe, executable))
                    .unwrap_or(false)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn terminate(&self, pid: u32) -> bool {
        let sys = Self::snapshot();
        match sys.process(Pid::from_u32(pid)) {
            Some(process) => process.kill(),
            // Already gone
            None => true,
        }
    }

    fn launch(&self, executable: &Path, working_dir: &Path) -> AppResult<u32> {
        let mut cmd = tokio::process::Command::new(executable);
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(target_os = "windows")]
        cmd.creation_flags(CREATE_NEW_CONSOLE);

        let child = cmd.spawn().map_err(|e| {
            AppError::Instance(format!("Failed to launch {}: {}", executable.display(), e))
        })?;

        child.id().ok_or_else(|| {
            AppError::Instance(format!(
                "{} exited before its pid could be read",
                executable.display()
            ))
        })
    }
}
