//! Retry policy: decides what a failed attempt turns into.

use chrono::{DateTime, Utc};

use crate::domain::{Task, TaskStatus};

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to the backlog for another producer.
    Retry,
    /// Budget spent; the task stays Failed for good.
    GiveUp,
}

/// Bounded retry: `max_retries` failed attempts in total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Record one failed attempt on `task` and move it accordingly.
    ///
    /// `retry_count` saturates at `max_retries`, so a late duplicate failure
    /// report cannot push it past the budget.
    pub fn record_failure(&self, task: &mut Task, now: DateTime<Utc>) -> RetryDecision {
        task.retry_count = task.retry_count.saturating_add(1).min(self.max_retries);
        if task.retry_count < self.max_retries {
            task.requeue(now);
            RetryDecision::Retry
        } else {
            task.mark_failed(now);
            RetryDecision::GiveUp
        }
    }

    pub fn is_exhausted(&self, task: &Task) -> bool {
        task.status == TaskStatus::Failed && task.retry_count >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Role, TaskSpec};
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn task() -> Task {
        Task::new(TaskSpec::new("US-002", "page"), BTreeSet::new(), Utc::now())
    }

    #[rstest]
    #[case::first_failure(1, RetryDecision::Retry, TaskStatus::Backlog)]
    #[case::second_failure(2, RetryDecision::Retry, TaskStatus::Backlog)]
    #[case::third_failure(3, RetryDecision::GiveUp, TaskStatus::Failed)]
    fn failures_count_toward_the_budget(
        #[case] failures: u32,
        #[case] last: RetryDecision,
        #[case] status: TaskStatus,
    ) {
        let policy = RetryPolicy::default();
        let mut t = task();
        let mut decision = RetryDecision::Retry;
        for _ in 0..failures {
            decision = policy.record_failure(&mut t, Utc::now());
        }
        assert_eq!(decision, last);
        assert_eq!(t.status, status);
        assert_eq!(t.retry_count, failures);
    }

    #[test]
    fn retry_count_never_exceeds_budget() {
        let policy = RetryPolicy::new(2);
        let mut t = task();
        for _ in 0..5 {
            policy.record_failure(&mut t, Utc::now());
        }
        assert_eq!(t.retry_count, 2);
        assert!(policy.is_exhausted(&t));
        assert!(!t.consumable_by(Role::Producer, policy.max_retries));
    }
}
