//! Foundation gate.
//!
//! Until the bootstrap task is Done only one producer may work. Once it is
//! Done the configured maximum applies for the rest of the run.

use tracing::{info, warn};

use crate::domain::{Priority, SchedulerState, Task, TaskId};

/// Decides whether a task is the bootstrap task.
pub trait FoundationDetector: Send + Sync {
    fn is_foundation(&self, task: &Task) -> bool;
}

/// Matches the explicit flag, a setup-like keyword in the title or
/// description, or a high-priority first task (`US-001`, `story-1`).
#[derive(Debug, Clone)]
pub struct KeywordDetector {
    keywords: Vec<String>,
}

impl KeywordDetector {
    pub const DEFAULT_KEYWORDS: &'static [&'static str] = &[
        "setup",
        "set up",
        "scaffold",
        "bootstrap",
        "initialize",
        "initialise",
    ];

    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }

    fn mentions_keyword(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

impl Default for KeywordDetector {
    fn default() -> Self {
        Self::with_keywords(Self::DEFAULT_KEYWORDS.iter().copied())
    }
}

impl FoundationDetector for KeywordDetector {
    fn is_foundation(&self, task: &Task) -> bool {
        task.foundation
            || self.mentions_keyword(&task.title)
            || self.mentions_keyword(&task.description)
            || (matches!(task.priority, Priority::Critical | Priority::High)
                && task.id.is_first_in_sequence())
    }
}

/// Only the explicit `foundation` flag counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagDetector;

impl FoundationDetector for FlagDetector {
    fn is_foundation(&self, task: &Task) -> bool {
        task.foundation
    }
}

pub struct FoundationGate {
    enabled: bool,
    max_producers: usize,
    detector: Box<dyn FoundationDetector>,
    foundation_task_id: Option<TaskId>,
    foundation_complete: bool,
}

impl FoundationGate {
    pub fn new(enabled: bool, max_producers: usize, detector: Box<dyn FoundationDetector>) -> Self {
        Self {
            enabled,
            max_producers,
            detector,
            foundation_task_id: None,
            foundation_complete: false,
        }
    }

    /// 1 while a bound foundation task is unfinished, the configured maximum
    /// otherwise.
    pub fn allowed_producer_limit(&self) -> usize {
        if self.is_gating() {
            1
        } else {
            self.max_producers
        }
    }

    pub fn is_gating(&self) -> bool {
        self.enabled && self.foundation_task_id.is_some() && !self.foundation_complete
    }

    pub fn set_max_producers(&mut self, max_producers: usize) {
        self.max_producers = max_producers;
    }

    /// Bind `task` as the foundation if nothing is bound yet and it matches
    /// the detector. Returns true when this call did the binding.
    ///
    /// Refused while more than one producer is working: gating after the
    /// fact would leave the limit already exceeded.
    pub fn maybe_bind_foundation(&mut self, task: &Task, working_producers: usize) -> bool {
        if !self.enabled || self.foundation_task_id.is_some() || self.foundation_complete {
            return false;
        }
        if working_producers > 1 || !self.detector.is_foundation(task) {
            return false;
        }
        info!(task = %task.id, "foundation task bound; producers limited to 1");
        self.foundation_task_id = Some(task.id.clone());
        true
    }

    pub fn is_foundation(&self, id: &TaskId) -> bool {
        self.foundation_task_id.as_ref() == Some(id)
    }

    /// Bound, unfinished foundation id that new tasks should wait for.
    pub fn pending_foundation(&self) -> Option<&TaskId> {
        if self.is_gating() {
            self.foundation_task_id.as_ref()
        } else {
            None
        }
    }

    /// Called when `id` reaches Done. True only on the one unlocking call.
    pub fn complete(&mut self, id: &TaskId) -> bool {
        if self.foundation_complete || !self.is_foundation(id) {
            return false;
        }
        self.foundation_complete = true;
        info!(
            task = %id,
            max_producers = self.max_producers,
            "foundation complete; full parallelism unlocked"
        );
        true
    }

    pub fn foundation_task_id(&self) -> Option<&TaskId> {
        self.foundation_task_id.as_ref()
    }

    pub fn foundation_complete(&self) -> bool {
        self.foundation_complete
    }

    /// Rehydrate from a checkpoint. An already bound foundation is kept and
    /// a completed gate stays completed.
    pub fn restore(&mut self, state: &SchedulerState) {
        if self.foundation_task_id.is_none() {
            self.foundation_task_id = state.foundation_task_id.clone();
        } else if state.foundation_task_id.is_some()
            && state.foundation_task_id != self.foundation_task_id
        {
            warn!(
                bound = ?self.foundation_task_id,
                checkpoint = ?state.foundation_task_id,
                "checkpoint names a different foundation; keeping the bound one"
            );
            return;
        }
        self.foundation_complete |= state.foundation_complete;
    }
}

impl std::fmt::Debug for FoundationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoundationGate")
            .field("enabled", &self.enabled)
            .field("max_producers", &self.max_producers)
            .field("foundation_task_id", &self.foundation_task_id)
            .field("foundation_complete", &self.foundation_complete)
            .finish_non_exhaustive()
    }
}
