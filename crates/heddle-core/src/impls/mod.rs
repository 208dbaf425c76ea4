//! Impls - implementations of the ports.
//!
//! - **FileSnapshotStore**: atomic JSON file on local disk
//! - **InMemorySnapshotStore**: for tests and dry runs

pub mod file_snapshot;
pub mod memory_snapshot;

pub use self::file_snapshot::FileSnapshotStore;
pub use self::memory_snapshot::InMemorySnapshotStore;
