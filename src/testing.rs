//! Test support shared by unit and integration tests

use crate::error::AppResult;
use crate::instance::{paths_match, ProcessControl};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// In-memory process table
#[derive(Debug, Default)]
pub struct FakeProcesses {
    running: Mutex<Vec<(u32, PathBuf)>>,
    next_pid: Mutex<u32>,
}

impl FakeProcesses {
    /// Table with one process already running `executable`
    pub fn with_running(executable: &Path) -> Self {
        let fake = Self::default();
        let _ = fake.launch(executable, Path::new("."));
        fake
    }

    pub fn count(&self) -> usize {
        self.table().len()
    }

    pub fn running_executables(&self) -> Vec<PathBuf> {
        self.table().iter().map(|(_, exe)| exe.clone()).collect()
    }

    fn table(&self) -> MutexGuard<'_, Vec<(u32, PathBuf)>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProcessControl for FakeProcesses {
    fn list_running_instances_of(&self, executable: &Path) -> Vec<u32> {
        self.table()
            .iter()
            .filter(|(_, exe)| paths_match(exe, executable))
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn terminate(&self, pid: u32) -> bool {
        self.table().retain(|(p, _)| *p != pid);
        true
    }

    fn launch(&self, executable: &Path, _working_dir: &Path) -> AppResult<u32> {
        let mut next = self.next_pid.lock().unwrap_or_else(|e| e.into_inner());
        *next += 1;
        let pid = 1000 + *next;
        self.table().push((pid, executable.to_path_buf()));
        Ok(pid)
    }
}
