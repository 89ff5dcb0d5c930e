//! Single-writer gate between update cycles and the status poller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct UpdateGate {
    active: Arc<AtomicBool>,
}

impl UpdateGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or None if a cycle already holds it
    pub fn try_begin(&self) -> Option<UpdateLease> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UpdateLease {
                active: self.active.clone(),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Held for the duration of a cycle; releases the gate on drop
#[derive(Debug)]
pub struct UpdateLease {
    active: Arc<AtomicBool>,
}

impl Drop for UpdateLease {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
