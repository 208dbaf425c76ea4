//! SnapshotStore port - where snapshots go.
//!
//! The in-memory scheduler state is authoritative; the store only has to hold
//! the latest snapshot well enough to recover from a crash.

use async_trait::async_trait;

use crate::domain::{Snapshot, SnapshotError};

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot. Must be atomic: a reader sees either the
    /// previous snapshot or this one, never a torn write.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;

    /// Latest snapshot, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<Snapshot>, SnapshotError>;
}
