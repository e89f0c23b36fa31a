//! Time-boxed memoization of range-queried reads.
//!
//! # Invariants
//! - An entry is fresh while `now - cached_at < ttl`.
//! - Expired entries are ignored and overwritten, never served.
//! - Local mutations never invalidate entries: a record created inside a
//!   cached range shows up only after that entry expires.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;

/// Cache key derived from normalized query bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeKey {
    start_ms: i64,
    end_ms: i64,
}

impl RangeKey {
    /// Orders the bounds and truncates them to whole milliseconds.
    pub fn normalized(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        Self {
            start_ms: start.timestamp_millis(),
            end_ms: end.timestamp_millis(),
        }
    }

    /// Normalized bounds as instants.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (from_millis(self.start_ms), from_millis(self.end_ms))
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<R> {
    pub payload: Vec<R>,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeCache<R> {
    entries: HashMap<RangeKey, CacheEntry<R>>,
}

impl<R> Default for RangeCache<R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<R> RangeCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the payload for `key` when it is still fresh at `now`.
    pub fn lookup(&self, key: &RangeKey, now: DateTime<Utc>, ttl: TimeDelta) -> Option<&[R]> {
        self.entries
            .get(key)
            .filter(|entry| now - entry.cached_at < ttl)
            .map(|entry| entry.payload.as_slice())
    }

    pub fn store(&mut self, key: RangeKey, payload: Vec<R>, cached_at: DateTime<Utc>) {
        self.entries.insert(key, CacheEntry { payload, cached_at });
    }

    /// Drops entries that are no longer fresh; returns how many were dropped.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.cached_at < ttl);
        before - self.entries.len()
    }
}
