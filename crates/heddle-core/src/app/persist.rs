//! Background snapshot writer.
//!
//! Callers hand over the latest snapshot with `submit`, which never waits.
//! A single task drains a `watch` channel and writes snapshots one after
//! another; if several arrive while a write is in flight only the newest is
//! written next. Write failures are logged and otherwise ignored.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::Snapshot;
use crate::ports::SnapshotStore;

pub struct SnapshotWriter {
    sender: watch::Sender<Option<Snapshot>>,
    handle: JoinHandle<()>,
}

impl SnapshotWriter {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn SnapshotStore>) -> Self {
        let (sender, mut receiver) = watch::channel::<Option<Snapshot>>(None);
        let handle = tokio::spawn(async move {
            // Also returns Ok for a value sent just before the sender dropped,
            // so the final snapshot is always written.
            while receiver.changed().await.is_ok() {
                let latest = receiver.borrow_and_update().clone();
                let Some(snapshot) = latest else { continue };
                match store.save(&snapshot).await {
                    Ok(()) => debug!(tasks = snapshot.tasks.len(), "snapshot written"),
                    Err(e) => warn!(error = %e, "failed to write snapshot; keeping in-memory state"),
                }
            }
        });
        Self { sender, handle }
    }

    /// Queue `snapshot`, replacing any snapshot not yet written.
    pub fn submit(&self, snapshot: Snapshot) {
        self.sender.send_replace(Some(snapshot));
    }

    /// Write whatever is pending, then stop the writer task.
    pub async fn shutdown(self) {
        let Self { sender, handle } = self;
        drop(sender);
        if let Err(e) = handle.await {
            warn!(error = %e, "snapshot writer task ended abnormally");
        }
    }
}
