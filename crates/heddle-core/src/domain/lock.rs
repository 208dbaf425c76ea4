//! File lease record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TaskId, WorkerId};

/// A lease on a workspace-relative path.
///
/// Locks are advisory: the scheduler never looks at the file, it only keeps
/// two workers from claiming the same path string at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLock {
    pub path: String,
    pub owner: WorkerId,
    pub task_id: TaskId,
    pub acquired_at: DateTime<Utc>,
    pub lease_ttl: Duration,
}

impl FileLock {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        // A clock that stepped backwards yields a zero age, not a panic.
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Stale once the lease is at least `lease_ttl` old.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age(now) >= self.lease_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn lock(acquired_at: DateTime<Utc>) -> FileLock {
        FileLock {
            path: "app/page.tsx".to_string(),
            owner: WorkerId::from_ulid(Ulid::new()),
            task_id: TaskId::new("US-002"),
            acquired_at,
            lease_ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn fresh_lock_is_live() {
        let now = Utc::now();
        assert!(!lock(now).is_stale(now + chrono::Duration::seconds(59)));
    }

    #[test]
    fn lock_goes_stale_at_ttl() {
        let now = Utc::now();
        assert!(lock(now).is_stale(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn clock_going_backwards_is_not_stale() {
        let now = Utc::now();
        let l = lock(now);
        assert_eq!(l.age(now - chrono::Duration::seconds(5)), Duration::ZERO);
        assert!(!l.is_stale(now - chrono::Duration::seconds(5)));
    }
}
