//! Merging state written by other execution contexts.
//!
//! The reconciler turns raw [`StorageEvent`]s into typed changes the engine
//! can apply. It also owns the feedback guard: right after this context
//! persisted, incoming changes are dropped so a transport that echoes writes
//! back cannot make a context re-apply its own state.

use chrono::{DateTime, FixedOffset};

use super::pomodoro::PomodoroState;
use super::records::{decode, RunningRecord, SessionsRecord};
use super::session::{RunningSession, SessionKind, TimeSession};
use crate::clock::same_day;
use crate::storage::{keys, StorageEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    /// Replaces local Pomodoro state wholesale.
    Pomodoro(PomodoroState),
    /// A session started today is running elsewhere.
    Running(RunningSession),
    /// Nothing runs elsewhere.
    Stopped {
        is_paused: bool,
        paused_kind: SessionKind,
    },
    History(Vec<TimeSession>),
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    guard_ms: i64,
    suppressed_until_ms: i64,
}

impl Reconciler {
    pub fn new(guard_ms: u64) -> Self {
        Self {
            guard_ms: i64::try_from(guard_ms).unwrap_or(i64::MAX),
            suppressed_until_ms: i64::MIN,
        }
    }

    pub fn note_local_write(&mut self, now_ms: i64) {
        self.suppressed_until_ms = now_ms.saturating_add(self.guard_ms);
    }

    pub fn accepts(&self, now_ms: i64) -> bool {
        now_ms >= self.suppressed_until_ms
    }

    /// What a foreign write means for this context, if anything.
    pub fn interpret(&self, event: &StorageEvent, now: DateTime<FixedOffset>) -> Option<RemoteChange> {
        let key = event.key.as_str();
        match key {
            keys::POMODORO => {
                let state = match event.new_value.as_deref() {
                    Some(raw) => decode::<PomodoroState>(key, raw)?,
                    None => PomodoroState::default(),
                };
                Some(RemoteChange::Pomodoro(state))
            }
            keys::RUNNING => {
                let Some(raw) = event.new_value.as_deref() else {
                    return Some(RemoteChange::Stopped {
                        is_paused: false,
                        paused_kind: SessionKind::Focus,
                    });
                };
                let record = decode::<RunningRecord>(key, raw)?;
                match record.running_session {
                    Some(mut session) if record.is_running => {
                        if !same_day(&session.start_time, &now, now.offset()) {
                            tracing::debug!(
                                session = %session.id,
                                "ignoring remote session started on another day"
                            );
                            return None;
                        }
                        session.refresh(now);
                        Some(RemoteChange::Running(session))
                    }
                    _ => Some(RemoteChange::Stopped {
                        is_paused: record.is_paused,
                        paused_kind: record.paused_kind,
                    }),
                }
            }
            keys::SESSIONS => {
                let record = decode::<SessionsRecord>(key, event.new_value.as_deref()?)?;
                Some(RemoteChange::History(record.sessions))
            }
            _ => None,
        }
    }
}
