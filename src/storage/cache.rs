//! Write-back cache for measurement rows.
//!
//! Rows are buffered in insertion order and written as one multi-row upsert
//! once `max_row` rows are pending or the oldest pending row is `max_delay`
//! old. A failed flush keeps the rows for the next attempt.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use duckdb::{Connection, ToSql};

use crate::storage::StorageError;
use crate::storage::types::TopicId;

/// Default number of pending rows that triggers a flush.
pub const DEFAULT_MAX_ROW: usize = 1000;

/// Default age of the oldest pending row that triggers a flush.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);

/// One pending measurement row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub time: i64,
    pub value: i32,
    pub scale: i16,
    pub topic_id: TopicId,
}

/// Buffer of pending measurement rows.
#[derive(Debug)]
pub struct MultiRowCache {
    rows: Vec<CacheEntry>,
    first_push: Instant,
    max_row: usize,
    max_delay: Duration,
}

impl Default for MultiRowCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROW, DEFAULT_MAX_DELAY)
    }
}

impl MultiRowCache {
    pub fn new(max_row: usize, max_delay: Duration) -> Self {
        Self {
            rows: Vec::with_capacity(max_row),
            first_push: Instant::now(),
            max_row,
            max_delay,
        }
    }

    pub fn max_row(&self) -> usize {
        self.max_row
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row.
    pub fn push(&mut self, time: i64, value: i32, scale: i16, topic_id: TopicId) {
        // The delay clock measures the oldest pending row, not idle time.
        if self.rows.is_empty() {
            self.first_push = Instant::now();
        }
        self.rows.push(CacheEntry {
            time,
            value,
            scale,
            topic_id,
        });
    }

    /// True when enough rows are pending or the oldest one is too old.
    pub fn is_ready_for_flush(&self) -> bool {
        self.rows.len() >= self.max_row
            || (!self.rows.is_empty() && self.first_push.elapsed() >= self.max_delay)
    }

    /// Drop all pending rows.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.first_push = Instant::now();
    }

    /// Drop the pending rows of `topic_ids`, returning how many were removed.
    pub fn discard_topics(&mut self, topic_ids: &[TopicId]) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !topic_ids.contains(&row.topic_id));
        if self.rows.is_empty() {
            self.first_push = Instant::now();
        }
        before - self.rows.len()
    }

    /// Write all pending rows in a single statement.
    ///
    /// Returns the number of rows written. On error the buffer is left intact.
    pub fn flush(&mut self, conn: &Connection) -> Result<usize, StorageError> {
        if self.rows.is_empty() {
            self.first_push = Instant::now();
            return Ok(0);
        }

        let rows = self.coalesced();
        let sql = upsert_statement(rows.len());

        let mut params: Vec<Box<dyn ToSql>> = Vec::with_capacity(rows.len() * 4);
        for row in &rows {
            params.push(Box::new(row.time));
            params.push(Box::new(row.value));
            params.push(Box::new(row.scale));
            params.push(Box::new(i64::from(row.topic_id)));
        }
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let written = conn.execute(&sql, param_refs.as_slice())?;
        tracing::debug!(
            pending = self.rows.len(),
            written,
            "Measurements flushed from cache"
        );
        self.clear();
        Ok(written)
    }

    /// Pending rows with only the last write per `(topic_id, time)` kept.
    ///
    /// The store rejects a batch that upserts the same key twice.
    fn coalesced(&self) -> Vec<CacheEntry> {
        let mut last: HashMap<(TopicId, i64), usize> = HashMap::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            last.insert((row.topic_id, row.time), i);
        }
        self.rows
            .iter()
            .enumerate()
            .filter(|(i, row)| last.get(&(row.topic_id, row.time)) == Some(i))
            .map(|(_, row)| *row)
            .collect()
    }
}

fn upsert_statement(rows: usize) -> String {
    let mut sql = String::from("INSERT INTO measurement (ts, value, scale, id_topic) VALUES ");
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str("(?, ?, ?, ?)");
    }
    sql.push_str(
        " ON CONFLICT (id_topic, ts) DO UPDATE SET value = EXCLUDED.value, scale = EXCLUDED.scale",
    );
    sql
}
