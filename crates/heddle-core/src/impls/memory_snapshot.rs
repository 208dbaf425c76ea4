//! InMemorySnapshotStore - keeps the last snapshot in memory (tests, dry runs).

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{Snapshot, SnapshotError};
use crate::ports::SnapshotStore;

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    latest: Mutex<Option<Snapshot>>,
    saves: Mutex<usize>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.latest())
    }
}
