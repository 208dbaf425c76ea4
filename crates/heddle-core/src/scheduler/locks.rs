//! File lease table.
//!
//! One lease per path string. A lease older than its TTL is treated as
//! abandoned and handed to the next requester.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{FileLock, TaskId, WorkerId};

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockGrant {
    /// Path was free.
    Granted,
    /// Requester already held it; lease refreshed.
    Renewed,
    /// Previous lease had expired and was taken over.
    Reclaimed { previous: FileLock },
    /// Someone else holds a live lease.
    Conflict { held_by: WorkerId },
}

#[derive(Debug)]
pub struct LockManager {
    locks: HashMap<String, FileLock>,
    lease_ttl: Duration,
}

impl LockManager {
    pub fn new(lease_ttl: Duration) -> Self {
        Self {
            locks: HashMap::new(),
            lease_ttl,
        }
    }

    pub fn acquire(
        &mut self,
        path: &str,
        worker: WorkerId,
        task: &TaskId,
        now: DateTime<Utc>,
    ) -> LockGrant {
        let lease = FileLock {
            path: path.to_string(),
            owner: worker,
            task_id: task.clone(),
            acquired_at: now,
            lease_ttl: self.lease_ttl,
        };

        let grant = match self.locks.get(path) {
            None => LockGrant::Granted,
            Some(held) if held.owner == worker => LockGrant::Renewed,
            Some(held) if held.is_stale(now) => {
                warn!(
                    path,
                    previous_owner = %held.owner,
                    previous_task = %held.task_id,
                    age_secs = held.age(now).as_secs(),
                    new_owner = %worker,
                    "reclaiming stale file lock"
                );
                LockGrant::Reclaimed {
                    previous: held.clone(),
                }
            }
            Some(held) => {
                return LockGrant::Conflict {
                    held_by: held.owner,
                };
            }
        };

        debug!(path, worker = %worker, task = %task, ?grant, "file lock granted");
        self.locks.insert(path.to_string(), lease);
        grant
    }

    /// Drop every lease tied to `task`. Returns how many were dropped.
    pub fn release_all(&mut self, task: &TaskId) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| &lock.task_id != task);
        before - self.locks.len()
    }

    /// Drop `path` if `worker` holds it.
    pub fn release(&mut self, path: &str, worker: WorkerId) -> bool {
        match self.locks.get(path) {
            Some(lock) if lock.owner == worker => {
                self.locks.remove(path);
                true
            }
            _ => false,
        }
    }

    pub fn release_everything(&mut self) -> usize {
        let n = self.locks.len();
        self.locks.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const PAGE: &str = "app/page.tsx";

    fn worker() -> WorkerId {
        WorkerId::from_ulid(Ulid::new())
    }

    fn manager() -> LockManager {
        LockManager::new(Duration::from_secs(60))
    }

    #[test]
    fn second_owner_conflicts_while_lease_is_live() {
        let mut locks = manager();
        let (x, y) = (worker(), worker());
        let now = Utc::now();

        assert_eq!(locks.acquire(PAGE, x, &TaskId::new("B"), now), LockGrant::Granted);
        assert_eq!(
            locks.acquire(PAGE, y, &TaskId::new("C"), now + chrono::Duration::seconds(59)),
            LockGrant::Conflict { held_by: x }
        );
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn same_owner_renews() {
        let mut locks = manager();
        let x = worker();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(30);

        locks.acquire(PAGE, x, &TaskId::new("B"), t0);
        assert_eq!(locks.acquire(PAGE, x, &TaskId::new("B"), t1), LockGrant::Renewed);
        assert_eq!(locks.len(), 1);

        // The renewed lease counts from t1, so it is still live at t0 + 60s.
        let late = t0 + chrono::Duration::seconds(60);
        assert_eq!(
            locks.acquire(PAGE, worker(), &TaskId::new("C"), late),
            LockGrant::Conflict { held_by: x }
        );
    }

    #[test]
    fn stale_lease_is_reclaimed() {
        let mut locks = manager();
        let (x, y) = (worker(), worker());
        let t0 = Utc::now();

        locks.acquire(PAGE, x, &TaskId::new("B"), t0);
        let grant = locks.acquire(PAGE, y, &TaskId::new("C"), t0 + chrono::Duration::seconds(60));

        assert!(matches!(grant, LockGrant::Reclaimed { ref previous } if previous.owner == x));
        assert_eq!(
            locks.acquire(PAGE, x, &TaskId::new("B"), t0 + chrono::Duration::seconds(61)),
            LockGrant::Conflict { held_by: y }
        );
    }

    #[test]
    fn release_all_only_touches_the_task() {
        let mut locks = manager();
        let x = worker();
        let now = Utc::now();
        locks.acquire("a.rs", x, &TaskId::new("B"), now);
        locks.acquire("b.rs", x, &TaskId::new("B"), now);
        locks.acquire("c.rs", worker(), &TaskId::new("C"), now);

        assert_eq!(locks.release_all(&TaskId::new("B")), 2);
        assert_eq!(locks.len(), 1);
        assert!(matches!(
            locks.acquire("c.rs", x, &TaskId::new("B"), now),
            LockGrant::Conflict { .. }
        ));
    }

    #[test]
    fn release_requires_the_owner() {
        let mut locks = manager();
        let (x, y) = (worker(), worker());
        locks.acquire(PAGE, x, &TaskId::new("B"), Utc::now());

        assert!(!locks.release(PAGE, y));
        assert!(locks.release(PAGE, x));
        assert!(locks.is_empty());
    }

    #[test]
    fn release_everything_clears_the_table() {
        let mut locks = manager();
        locks.acquire("a.rs", worker(), &TaskId::new("B"), Utc::now());
        locks.acquire("b.rs", worker(), &TaskId::new("C"), Utc::now());
        assert_eq!(locks.release_everything(), 2);
        assert!(locks.is_empty());
    }
}
