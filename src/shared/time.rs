//! Usage: Wall-clock access behind a trait so token expiry and provenance can be pinned in tests.

use chrono::{Local, TimeZone};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_unix_seconds(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_seconds(&self) -> i64 {
        now_unix_seconds()
    }
}

/// A clock frozen at a given unix timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_unix_seconds(&self) -> i64 {
        self.0
    }
}

pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Local `YYYY-MM-DD HH:MM:SS` rendering of a unix timestamp.
pub fn format_local_timestamp(unix_seconds: i64) -> String {
    match Local.timestamp_opt(unix_seconds, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => unix_seconds.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock(1_700_000_000);
        assert_eq!(clock.now_unix_seconds(), 1_700_000_000);
        assert_eq!(clock.now_unix_seconds(), 1_700_000_000);
    }

    #[test]
    fn local_timestamp_has_expected_shape() {
        let rendered = format_local_timestamp(1_700_000_000);
        assert_eq!(rendered.len(), 19);
        assert_eq!(&rendered[4..5], "-");
        assert_eq!(&rendered[10..11], " ");
        assert_eq!(&rendered[13..14], ":");
    }
}
