//! Domain model (ids, tasks, workers, locks, events, snapshots, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod lock;
pub mod snapshot;
pub mod task;
pub mod worker;

pub use errors::{ConfigError, HeddleError, SnapshotError};
pub use events::SchedulerEvent;
pub use ids::{Id, IdMarker, TaskId, WorkerId};
pub use lock::FileLock;
pub use snapshot::{SchedulerState, Snapshot};
pub use task::{Priority, Role, Task, TaskSpec, TaskStatus};
pub use worker::{Worker, WorkerStatus};
