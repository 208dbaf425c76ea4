//! Ports - seams to the outside world.
//!
//! Each trait hides something the scheduler needs but should not own: time,
//! id minting, and durable storage for snapshots.

pub mod clock;
pub mod id_generator;
pub mod snapshot_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::snapshot_store::SnapshotStore;
