//! Per-step measurement retention.

use std::collections::BTreeMap;
use std::time::Duration;

use duckdb::Connection;

use crate::storage::{StorageError, measurements};

/// Default maximum age in days per aggregation step. `0` keeps data forever.
pub const DEFAULT_STEP_AGES: [(&str, u32); 8] = [
    ("RT", 0),
    ("15m", 1),
    ("30m", 1),
    ("1h", 7),
    ("8h", 7),
    ("1d", 30),
    ("7d", 30),
    ("30d", 180),
];

/// Default time between retention passes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

const SECONDS_PER_DAY: i64 = 86_400;

/// How long measurements of each step are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub check_interval: Duration,
    /// Step name to maximum age in days.
    pub ages: BTreeMap<String, u32>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            ages: default_ages(),
        }
    }
}

pub fn default_ages() -> BTreeMap<String, u32> {
    DEFAULT_STEP_AGES
        .iter()
        .map(|(step, days)| (step.to_string(), *days))
        .collect()
}

impl RetentionPolicy {
    /// A policy that never deletes anything.
    pub fn disabled() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            ages: BTreeMap::new(),
        }
    }

    /// Delete measurements older than their step's age, relative to `now`.
    ///
    /// Returns the total number of rows deleted. Stops at the first failure.
    pub fn apply(&self, conn: &Connection, now: i64) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for (step, days) in self.ages.iter().filter(|(_, days)| **days > 0) {
            let cutoff = now.saturating_sub(i64::from(*days) * SECONDS_PER_DAY);
            deleted += measurements::purge_step_older_than(conn, step, cutoff)?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MultiRowCache, Store, registry};

    #[test]
    fn test_default_ages() {
        let ages = default_ages();
        assert_eq!(ages.len(), 8);
        assert_eq!(ages["RT"], 0);
        assert_eq!(ages["15m"], 1);
        assert_eq!(ages["30d"], 180);
    }

    #[test]
    fn test_apply_respects_step_ages() {
        let store = Store::in_memory().unwrap();
        let conn = store.connection().unwrap();
        let now = 100 * SECONDS_PER_DAY;

        let mut cache = MultiRowCache::default();
        let fast = registry::ensure_topic(&conn, "power_min_15m@ups", "W", "ups").unwrap();
        let slow = registry::ensure_topic(&conn, "power_min_30d@ups", "W", "ups").unwrap();
        let raw = registry::ensure_topic(&conn, "power_min_RT@ups", "W", "ups").unwrap();
        for id in [fast, slow, raw] {
            cache.push(now - 2 * SECONDS_PER_DAY, 1, 0, id);
            cache.push(now - 10, 1, 0, id);
        }
        cache.flush(&conn).unwrap();

        let deleted = RetentionPolicy::default().apply(&conn, now).unwrap();
        assert_eq!(deleted, 1);

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM measurement", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 5);
    }

    #[test]
    fn test_disabled_policy() {
        let store = Store::in_memory().unwrap();
        let conn = store.connection().unwrap();
        assert_eq!(RetentionPolicy::disabled().apply(&conn, i64::MAX).unwrap(), 0);
    }
}
