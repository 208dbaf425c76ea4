//! Domain identifiers (strongly-typed IDs).
//!
//! Two flavours live here:
//! - [`TaskId`]: supplied by the caller (story ids such as `US-001`), so it is a
//!   plain string newtype.
//! - [`Id<T>`]: minted by the scheduler itself. ULID based, with a phantom marker
//!   so a `WorkerId` can never be passed where another generated id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for generated ids.
///
/// Provides the prefix used by `Display` (`"worker-"`, ...).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
///
/// `T` is only a compile-time marker and takes no space at runtime.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for worker ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// Identifier of a worker slot. Ephemeral: regenerated on every process start.
pub type WorkerId = Id<Worker>;

/// Identifier of a task, chosen by whoever submits the work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id looks like the first story of a plan: its trailing
    /// digits parse to 1 (`US-001`, `story-1`, `1`).
    pub fn is_first_in_sequence(&self) -> bool {
        let stem = self.0.trim_end_matches(|c: char| c.is_ascii_digit());
        matches!(self.0[stem.len()..].parse::<u64>(), Ok(1))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn worker_ids_display_with_prefix() {
        let ulid = Ulid::new();
        let id = WorkerId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("worker-"));
    }

    #[test]
    fn worker_ids_serialize_as_bare_ulid() {
        let id = WorkerId::from_ulid(Ulid::new());
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, format!("\"{}\"", id.as_ulid()));
        let back: WorkerId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        assert_eq!(std::mem::size_of::<WorkerId>(), std::mem::size_of::<Ulid>());
    }

    #[test]
    fn task_ids_serialize_as_plain_strings() {
        let id = TaskId::new("US-001");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"US-001\"");
    }

    #[rstest]
    #[case("US-001", true)]
    #[case("story-1", true)]
    #[case("1", true)]
    #[case("US-010", false)]
    #[case("US-002", false)]
    #[case("setup", false)]
    fn first_in_sequence(#[case] id: &str, #[case] expected: bool) {
        assert_eq!(TaskId::new(id).is_first_in_sequence(), expected);
    }
}
