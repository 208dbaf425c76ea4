//! Scheduling core: plain synchronous data structures.
//!
//! Nothing in here locks, awaits or publishes. `app::orchestrator` owns one
//! instance of each behind a single mutex and wires events around them.

pub mod dependency;
pub mod gate;
pub mod locks;
pub mod pool;
pub mod retry;
pub mod store;

pub use self::dependency::{DependencyGraph, is_eligible};
pub use self::gate::{FlagDetector, FoundationDetector, FoundationGate, KeywordDetector};
pub use self::locks::{LockGrant, LockManager};
pub use self::pool::WorkerPool;
pub use self::retry::{RetryDecision, RetryPolicy};
pub use self::store::TaskStore;
