use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::timer::{PomodoroPhase, PomodoroState, RunningSession, SessionKind, TimeSession};

/// Every state change of the tracker produces an event.
/// Callers print them, forward them to a UI, or fire notifications from
/// `PhaseCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    TimerStarted {
        session_id: String,
        kind: SessionKind,
        at: DateTime<FixedOffset>,
    },
    TimerPaused {
        completed: Option<TimeSession>,
        at: DateTime<FixedOffset>,
    },
    TimerResumed {
        session_id: String,
        kind: SessionKind,
        at: DateTime<FixedOffset>,
    },
    TimerReset {
        completed: Option<TimeSession>,
        at: DateTime<FixedOffset>,
    },
    /// A running session crossed midnight and was cut in two. `closed` is
    /// `None` if the part before midnight was empty.
    SessionSplit {
        closed: Option<TimeSession>,
        continued_id: String,
        at: DateTime<FixedOffset>,
    },
    PomodoroStarted {
        phase: PomodoroPhase,
        remaining_ms: i64,
        at: DateTime<FixedOffset>,
    },
    PomodoroPaused {
        phase: PomodoroPhase,
        elapsed_ms: i64,
        at: DateTime<FixedOffset>,
    },
    PomodoroReset {
        at: DateTime<FixedOffset>,
    },
    PhaseSkipped {
        from: PomodoroPhase,
        to: PomodoroPhase,
        at: DateTime<FixedOffset>,
    },
    /// A phase ran its full length. The next phase waits for an explicit start.
    PhaseCompleted {
        from: PomodoroPhase,
        to: PomodoroPhase,
        work_count: u32,
        at: DateTime<FixedOffset>,
    },
    /// Another context took over ticking.
    LeadershipLost {
        foreign_heartbeat_ms: i64,
        at: DateTime<FixedOffset>,
    },
    /// No live leader was visible, so this context took over ticking.
    LeadershipAcquired {
        at: DateTime<FixedOffset>,
    },
    /// State written by another context was merged locally.
    RemoteApplied {
        key: String,
        at: DateTime<FixedOffset>,
    },
    StateSnapshot {
        is_running: bool,
        is_paused: bool,
        is_leader: bool,
        running_session: Option<RunningSession>,
        pomodoro: PomodoroState,
        pomodoro_remaining_ms: i64,
        today_minutes: u64,
        at: DateTime<FixedOffset>,
    },
}
