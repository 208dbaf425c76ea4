//! Scheduler configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! max_producers = 3
//! verifiers = 1
//! max_retries = 3
//! lease_ttl_secs = 300
//! foundation_gate = true
//! detector = "keyword"
//! snapshot_path = ".heddle/state.json"
//! event_capacity = 256
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::scheduler::{FlagDetector, FoundationDetector, KeywordDetector};

/// Which foundation heuristic to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Keyword,
    Flag,
}

impl DetectorKind {
    pub fn build(self) -> Box<dyn FoundationDetector> {
        match self {
            DetectorKind::Keyword => Box::new(KeywordDetector::default()),
            DetectorKind::Flag => Box::new(FlagDetector),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub max_producers: usize,
    pub verifiers: usize,
    pub max_retries: u32,
    pub lease_ttl_secs: u64,
    pub foundation_gate: bool,
    pub detector: DetectorKind,
    pub snapshot_path: Option<PathBuf>,
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_producers: 3,
            verifiers: 1,
            max_retries: 3,
            lease_ttl_secs: 300,
            foundation_gate: true,
            detector: DetectorKind::Keyword,
            snapshot_path: None,
            event_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_producers == 0 {
            return Err(ConfigError::Invalid("max_producers must be at least 1".into()));
        }
        if self.verifiers == 0 {
            return Err(ConfigError::Invalid(
                "verifiers must be at least 1; produced tasks would never leave testing".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}
