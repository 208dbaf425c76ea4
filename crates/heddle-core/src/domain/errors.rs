//! Error types.
//!
//! Scheduling itself never fails: bad reports are logged and ignored. What can
//! fail is registering work, loading configuration and touching the snapshot.

use super::ids::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum HeddleError {
    #[error("task {0} is already registered")]
    DuplicateTask(TaskId),

    #[error("task {0} depends on itself")]
    SelfDependency(TaskId),

    #[error("dependency cycle: {}", format_cycle(.0))]
    DependencyCycle(Vec<TaskId>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn format_cycle(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_the_path() {
        let err = HeddleError::DependencyCycle(vec![
            TaskId::new("A"),
            TaskId::new("B"),
            TaskId::new("A"),
        ]);
        assert_eq!(err.to_string(), "dependency cycle: A -> B -> A");
    }
}
