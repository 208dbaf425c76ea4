//! heddle-core
//!
//! Scheduler for a pool of producer and verifier workers sharing one file
//! tree: dependency-aware task selection, file leases, a foundation-first
//! concurrency gate and crash-recoverable snapshots.
//!
//! # Modules
//! - **domain**: tasks, workers, leases, events, snapshots, errors
//! - **scheduler**: synchronous core (task store, dependency graph, gate, locks, pool, retry)
//! - **ports**: clock, id generation, snapshot storage
//! - **impls**: file and in-memory snapshot stores
//! - **app**: `Orchestrator` facade, builder, config, event bus, snapshot writer

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod scheduler;

pub use app::{Orchestrator, OrchestratorBuilder, SchedulerConfig, SchedulerStatus};
pub use domain::{HeddleError, Role, SchedulerEvent, Task, TaskId, TaskSpec, TaskStatus, WorkerId};
