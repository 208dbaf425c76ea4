//! IdGenerator port - id minting.
//!
//! Worker ids are ULIDs stamped with the injected clock, so a `ManualClock`
//! gives deterministic timestamps in tests while the random part keeps them
//! unique.

use crate::domain::ids::WorkerId;
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_worker_id(&self) -> WorkerId;
}

/// ULID-based generator.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_worker_id(&self) -> WorkerId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        WorkerId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManualClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);
        let id1 = id_gen.generate_worker_id();
        let id2 = id_gen.generate_worker_id();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("worker-"));
    }

    #[test]
    fn timestamp_comes_from_the_clock() {
        let fixed = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(ManualClock::new(fixed));

        let id1 = id_gen.generate_worker_id();
        let id2 = id_gen.generate_worker_id();

        // Random part differs, timestamp part does not.
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed.timestamp_millis() as u64);
    }
}
