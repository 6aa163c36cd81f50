//! Wall-clock time source.
//!
//! Every elapsed-time calculation in the crate is `now - start`, so the clock
//! is the only source of time. The offset carried by [`Clock::now`] defines
//! where calendar days begin.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Reads the local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Settable clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock pinned to a UTC wall time; calendar days are UTC days.
    ///
    /// Returns `None` when the fields do not name a valid instant.
    pub fn at_utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(|start| Self::new(start.fixed_offset()))
    }

    pub fn set(&self, to: DateTime<FixedOffset>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance_ms(&self, ms: i64) {
        self.advance(Duration::milliseconds(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Start of the calendar day containing `at`, in `at`'s own offset.
pub fn start_of_day(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let midnight = at.date_naive().and_time(NaiveTime::MIN);
    at.offset()
        .from_local_datetime(&midnight)
        .single()
        .unwrap_or(at)
}

/// Whether `a` and `b` fall on the same calendar day as seen from `reference`'s offset.
pub fn same_day<A: TimeZone, B: TimeZone>(
    a: &DateTime<A>,
    b: &DateTime<B>,
    reference: &FixedOffset,
) -> bool {
    a.with_timezone(reference).date_naive() == b.with_timezone(reference).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn manual_clock_advances_all_clones() {
        let clock = ManualClock::at_utc(2025, 3, 10, 9, 0, 0).unwrap();
        let other = clock.clone();
        clock.advance_secs(90);
        assert_eq!(other.now().minute(), 1);
        assert_eq!(other.now().second(), 30);
    }

    #[test]
    fn manual_clock_rejects_invalid_date() {
        assert!(ManualClock::at_utc(2025, 2, 30, 9, 0, 0).is_none());
        assert!(ManualClock::at_utc(2025, 6, 2, 24, 0, 0).is_none());
    }

    #[test]
    fn start_of_day_respects_offset() {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = offset.with_ymd_and_hms(2025, 3, 10, 1, 30, 0).unwrap();
        let midnight = start_of_day(at);
        assert_eq!(midnight, offset.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(midnight.with_timezone(&Utc).hour(), 15);
    }

    #[test]
    fn same_day_uses_reference_offset() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let a = Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap();
        assert!(same_day(&a, &b, &utc));
        assert!(!same_day(&a, &b, &tokyo));
    }
}
