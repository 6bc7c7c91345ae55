//! Daily exhaustion marks for in-game resources.
//!
//! A resource marked exhausted stays exhausted until the next daily reset
//! at `reset_hour:00` UTC.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::HashMap;

/// Most recent reset boundary at or before `now`.
pub fn last_reset_boundary(now: DateTime<Utc>, reset_hour: u32) -> DateTime<Utc> {
    let reset_time = NaiveTime::from_hms_opt(reset_hour % 24, 0, 0).unwrap_or_default();
    let today = now.date_naive().and_time(reset_time).and_utc();
    if today <= now {
        today
    } else {
        today - Duration::days(1)
    }
}

/// Pure exhaustion rule: a mark holds until the first reset after it.
pub fn is_exhausted_at(marked_at: DateTime<Utc>, now: DateTime<Utc>, reset_hour: u32) -> bool {
    marked_at >= last_reset_boundary(now, reset_hour)
}

#[derive(Debug, Clone)]
pub struct ExhaustionTracker {
    reset_hour: u32,
    marks: HashMap<String, DateTime<Utc>>,
}

impl ExhaustionTracker {
    pub fn new(reset_hour: u32) -> Self {
        Self {
            reset_hour: reset_hour % 24,
            marks: HashMap::new(),
        }
    }

    pub fn reset_hour(&self) -> u32 {
        self.reset_hour
    }

    pub fn mark(&mut self, key: impl Into<String>, at: DateTime<Utc>) {
        let key = key.into();
        log::debug!("🔋 {} exhausted at {}", key, at);
        self.marks.insert(key, at);
    }

    pub fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.marks.get(key).copied()
    }

    pub fn clear(&mut self, key: &str) -> Option<DateTime<Utc>> {
        self.marks.remove(key)
    }

    pub fn clear_all(&mut self) {
        self.marks.clear();
    }

    pub fn is_exhausted(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.get(key)
            .is_some_and(|marked_at| is_exhausted_at(marked_at, now, self.reset_hour))
    }
}
