//! OrchestratorBuilder - wiring of ports and configuration.
//!
//! Validates the configuration up front (fail fast) and fills in default
//! ports: system clock, ULID worker ids, keyword or flag detector from config,
//! and a file snapshot store when `snapshot_path` is set.

use std::sync::Arc;

use crate::app::config::SchedulerConfig;
use crate::app::orchestrator::Orchestrator;
use crate::domain::HeddleError;
use crate::impls::FileSnapshotStore;
use crate::ports::{Clock, IdGenerator, SnapshotStore, SystemClock, UlidGenerator};
use crate::scheduler::FoundationDetector;

pub struct OrchestratorBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    detector: Option<Box<dyn FoundationDetector>>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl OrchestratorBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: None,
            id_generator: None,
            detector: None,
            snapshot_store: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, id_generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Overrides `config.detector`.
    pub fn with_detector(mut self, detector: Box<dyn FoundationDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Overrides `config.snapshot_path`.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Build the orchestrator. When a snapshot store is in play this spawns
    /// the writer task, so it must run inside a Tokio runtime.
    pub fn build(self) -> Result<Orchestrator, HeddleError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Box::new(UlidGenerator::new(clock.clone())));
        let detector = self.detector.unwrap_or_else(|| self.config.detector.build());
        let snapshot_store = self.snapshot_store.or_else(|| {
            self.config
                .snapshot_path
                .as_ref()
                .map(|p| Arc::new(FileSnapshotStore::new(p)) as Arc<dyn SnapshotStore>)
        });

        Ok(Orchestrator::from_parts(
            self.config,
            clock,
            id_generator,
            detector,
            snapshot_store,
        ))
    }
}
