//! App - the orchestrator and everything it wires together.
//!
//! - **orchestrator**: public facade, owns the scheduler core
//! - **builder**: configuration validation and port wiring
//! - **config**: `SchedulerConfig` (TOML)
//! - **events**: broadcast event bus
//! - **persist**: background snapshot writer
//! - **status**: status view types

pub mod builder;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod persist;
pub mod status;

pub use self::builder::OrchestratorBuilder;
pub use self::config::{DetectorKind, SchedulerConfig};
pub use self::events::EventBus;
pub use self::orchestrator::Orchestrator;
pub use self::persist::SnapshotWriter;
pub use self::status::{SchedulerStatus, TaskCounts};
