//! Tracked-time data model: the running session and completed sessions.

use chrono::{DateTime, FixedOffset, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::start_of_day;

/// Reporting bucket a session's time is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Focus,
    Meetings,
    Breaks,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Focus,
        Category::Meetings,
        Category::Breaks,
        Category::Other,
    ];
}

/// Why tracking started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub fn category(self) -> Category {
        match self {
            SessionKind::Focus => Category::Focus,
            SessionKind::ShortBreak | SessionKind::LongBreak => Category::Breaks,
        }
    }
}

/// The session currently being tracked.
///
/// Timestamps are kept to whole seconds so a completed session's `duration`
/// is exactly `end_time - start_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    /// Cached `now - start_time` from the last tick.
    #[serde(default)]
    pub elapsed_seconds: i64,
    pub category: Category,
    #[serde(default)]
    pub kind: SessionKind,
}

impl RunningSession {
    pub fn begin(kind: SessionKind, at: DateTime<FixedOffset>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: at.with_timezone(&Utc).trunc_subsecs(0),
            elapsed_seconds: 0,
            category: kind.category(),
            kind,
        }
    }

    /// Whole seconds since the start, never negative.
    pub fn live_elapsed(&self, now: DateTime<FixedOffset>) -> i64 {
        (now.with_timezone(&Utc) - self.start_time.trunc_subsecs(0))
            .num_seconds()
            .max(0)
    }

    pub fn refresh(&mut self, now: DateTime<FixedOffset>) {
        self.elapsed_seconds = self.live_elapsed(now);
    }

    /// Close this session at `end`. Returns `None` for a zero-length session.
    pub fn complete(&self, end: DateTime<FixedOffset>) -> Option<TimeSession> {
        let start = self.start_time.trunc_subsecs(0);
        let end = end.with_timezone(&Utc).trunc_subsecs(0);
        let duration = (end - start).num_seconds();
        if duration <= 0 {
            return None;
        }
        Some(TimeSession {
            id: self.id.clone(),
            start_time: start,
            end_time: end,
            duration,
            category: self.category,
        })
    }

    /// If `now` is on a later calendar day than the start, close the session at
    /// `now`'s midnight and continue it from there.
    ///
    /// Only the most recent midnight is used; a session spanning several
    /// midnights produces one closed segment covering all of them. The session
    /// is continued from midnight even when the closed segment is empty.
    pub fn split_at_midnight(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Option<(Option<TimeSession>, RunningSession)> {
        let offset = *now.offset();
        if self.start_time.with_timezone(&offset).date_naive() >= now.date_naive() {
            return None;
        }
        let midnight = start_of_day(now);
        let closed = self.complete(midnight);
        let mut continued = RunningSession::begin(self.kind, midnight);
        continued.category = self.category;
        continued.refresh(now);
        Some((closed, continued))
    }
}

/// A completed, immutable stretch of tracked time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds.
    pub duration: i64,
    pub category: Category,
}
