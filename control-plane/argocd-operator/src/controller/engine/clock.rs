use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that advances one second on every read.
#[derive(Debug)]
pub struct StepClock {
    next: AtomicI64,
}

impl StepClock {
    pub fn starting_at(epoch_secs: i64) -> Self {
        Self {
            next: AtomicI64::new(epoch_secs),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.next.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Render a timestamp as a valid label value (alphanumerics, `.`, no `:`).
pub fn label_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}
