//! Per-owner single-flight for scans, plus cooperative cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::ScanError;

/// Shared cancellation flag checked by the scan loop between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks which owners currently have a scan running.
#[derive(Debug, Clone, Default)]
pub struct ScanCoordinator {
    running: Arc<Mutex<HashMap<String, CancelFlag>>>,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancelFlag>> {
        // The map holds no invariant a panicking holder could break.
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the scan slot for `owner`.
    ///
    /// Fails with [`ScanError::AlreadyRunning`] while another guard for
    /// the same owner is alive.
    pub fn try_begin(&self, owner: &str) -> Result<ScanGuard, ScanError> {
        let mut running = self.lock();
        if running.contains_key(owner) {
            return Err(ScanError::AlreadyRunning(owner.to_string()));
        }
        let flag = CancelFlag::new();
        running.insert(owner.to_string(), flag.clone());
        Ok(ScanGuard {
            running: Arc::clone(&self.running),
            owner: owner.to_string(),
            flag,
        })
    }

    /// Requests cancellation of the running scan. Returns false when no
    /// scan is running for `owner`.
    pub fn cancel(&self, owner: &str) -> bool {
        match self.lock().get(owner) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, owner: &str) -> bool {
        self.lock().contains_key(owner)
    }
}

/// Holds an owner's scan slot; releases it on drop.
#[derive(Debug)]
pub struct ScanGuard {
    running: Arc<Mutex<HashMap<String, CancelFlag>>>,
    owner: String,
    flag: CancelFlag,
}

impl ScanGuard {
    pub fn cancel_flag(&self) -> CancelFlag {
        self.flag.clone()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.owner);
    }
}
