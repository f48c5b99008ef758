//! Time variables and transaction identity.
//!
//! The clock is sampled once at transaction creation so every `TIME_*`
//! reference within a transaction observes the same instant.

use chrono::{DateTime, Datelike, Local, Timelike};
use std::sync::atomic::{AtomicU64, Ordering};

static TX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Snapshot of the local clock for one transaction.
#[derive(Debug, Clone)]
pub struct TimeInfo {
    created: DateTime<Local>,
}

impl TimeInfo {
    /// Sample the clock now.
    pub fn now() -> Self {
        Self {
            created: Local::now(),
        }
    }

    /// `hh:mm:ss`.
    pub fn time(&self) -> String {
        self.created.format("%H:%M:%S").to_string()
    }

    /// Seconds since the Unix epoch.
    pub fn epoch(&self) -> String {
        self.created.timestamp().to_string()
    }

    /// Day of month.
    pub fn day(&self) -> String {
        self.created.day().to_string()
    }

    /// Hour (0-23).
    pub fn hour(&self) -> String {
        self.created.hour().to_string()
    }

    /// Minute.
    pub fn minute(&self) -> String {
        self.created.minute().to_string()
    }

    /// Second.
    pub fn second(&self) -> String {
        self.created.second().to_string()
    }

    /// Day of week, 0 = Sunday.
    pub fn weekday(&self) -> String {
        self.created
            .weekday()
            .num_days_from_sunday()
            .to_string()
    }

    /// Month (1-12).
    pub fn month(&self) -> String {
        self.created.month().to_string()
    }

    /// Four-digit year.
    pub fn year(&self) -> String {
        self.created.year().to_string()
    }

    /// Milliseconds elapsed since the snapshot.
    pub fn elapsed_ms(&self) -> i64 {
        (Local::now() - self.created).num_milliseconds()
    }

    /// RFC 3339 rendering for audit records.
    pub fn rfc3339(&self) -> String {
        self.created.to_rfc3339()
    }

    /// Generate a transaction unique id from the timestamp and a process
    /// counter.
    pub fn unique_id(&self) -> String {
        let seq = TX_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!(
            "{:x}{:04x}",
            self.created.timestamp_micros() as u64,
            seq & 0xffff
        )
    }
}
