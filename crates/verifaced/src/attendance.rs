//! Attendance ledger with a per-person cooldown.
//!
//! A person can be marked present again only after the cooldown has fully
//! elapsed since their previous mark. Records are kept in memory for the
//! lifetime of the process, oldest first.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of an attendance mark attempt.
#[derive(Debug)]
pub enum RecordOutcome {
    Recorded(AttendanceRecord),
    /// Still inside the cooldown window; retry after this many seconds.
    CoolingDown { retry_after_secs: u64 },
}

pub struct AttendanceLog {
    cooldown: Duration,
    records: Mutex<Vec<AttendanceRecord>>,
}

impl AttendanceLog {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, name: &str) -> RecordOutcome {
        self.record_at(name, Utc::now())
    }

    /// Mark `name` present at `now`. Rejects the mark if their latest record
    /// is younger than the cooldown.
    pub fn record_at(&self, name: &str, now: DateTime<Utc>) -> RecordOutcome {
        let mut records = self.records.lock();
        if let Some(last) = records.iter().rev().find(|record| record.name == name) {
            let elapsed = now - last.timestamp;
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                // Round up so a sub-second remainder never reports zero.
                let retry_after_secs = ((remaining.num_milliseconds() + 999) / 1000).max(1) as u64;
                return RecordOutcome::CoolingDown { retry_after_secs };
            }
        }
        let record = AttendanceRecord {
            name: name.to_string(),
            timestamp: now,
        };
        records.push(record.clone());
        RecordOutcome::Recorded(record)
    }

    /// Records newest first, optionally capped at `limit`.
    pub fn recent(&self, limit: Option<usize>) -> Vec<AttendanceRecord> {
        let records = self.records.lock();
        let iter = records.iter().rev().cloned();
        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
