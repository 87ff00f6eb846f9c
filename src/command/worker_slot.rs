use super::command_os::WorkerProcess;
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the current worker, if any.
///
/// Readers get their own `Arc` so the lock is never held while talking to the process.
#[derive(Debug, Default)]
pub struct WorkerSlot {
    worker: RwLock<Option<Arc<WorkerProcess>>>,
}

impl WorkerSlot {
    pub fn get(&self) -> Option<Arc<WorkerProcess>> {
        self.worker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores a new worker. Returns the previous one, which the caller must terminate.
    pub fn replace(&self, worker: WorkerProcess) -> Option<Arc<WorkerProcess>> {
        self.worker
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::new(worker))
    }

    pub fn take(&self) -> Option<Arc<WorkerProcess>> {
        self.worker
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Liveness of the current worker, an empty slot is not alive.
    pub fn is_alive(&self) -> bool {
        self.get().is_some_and(|worker| worker.is_alive())
    }

    pub fn pid(&self) -> Option<u32> {
        self.get().map(|worker| worker.pid())
    }
}
