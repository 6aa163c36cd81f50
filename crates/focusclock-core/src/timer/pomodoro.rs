//! Fixed-phase Pomodoro state machine.
//!
//! ```text
//! work --(count+1) % 3 != 0--> short --> work
//! work --(count+1) % 3 == 0--> long  --> work (count reset)
//! ```
//!
//! Running/paused is orthogonal to the phase. Elapsed time while running is
//! `elapsed_ms + (now - started_at)`; `elapsed_ms` only grows when leaving the
//! running sub-state.

use serde::{Deserialize, Serialize};

use super::session::SessionKind;

pub const WORK_MS: i64 = 25 * 60 * 1000;
pub const SHORT_BREAK_MS: i64 = 5 * 60 * 1000;
pub const LONG_BREAK_MS: i64 = 15 * 60 * 1000;

/// Every third completed work phase earns a long break.
pub const WORK_PHASES_PER_LONG_BREAK: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PomodoroPhase {
    #[default]
    Work,
    Short,
    Long,
}

impl PomodoroPhase {
    pub fn duration_ms(self) -> i64 {
        match self {
            PomodoroPhase::Work => WORK_MS,
            PomodoroPhase::Short => SHORT_BREAK_MS,
            PomodoroPhase::Long => LONG_BREAK_MS,
        }
    }

    /// The kind of tracked session recorded while this phase runs.
    pub fn session_kind(self) -> SessionKind {
        match self {
            PomodoroPhase::Work => SessionKind::Focus,
            PomodoroPhase::Short => SessionKind::ShortBreak,
            PomodoroPhase::Long => SessionKind::LongBreak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroState {
    pub phase: PomodoroPhase,
    pub is_running: bool,
    /// Epoch ms of the last start/resume; `0` when not running.
    pub started_at: i64,
    pub elapsed_ms: i64,
    pub work_count: u32,
    pub total_time_ms: i64,
}

impl Default for PomodoroState {
    fn default() -> Self {
        Self {
            phase: PomodoroPhase::Work,
            is_running: false,
            started_at: 0,
            elapsed_ms: 0,
            work_count: 0,
            total_time_ms: WORK_MS,
        }
    }
}

impl PomodoroState {
    pub fn live_elapsed_ms(&self, now_ms: i64) -> i64 {
        if self.is_running && self.started_at > 0 {
            self.elapsed_ms + (now_ms - self.started_at).max(0)
        } else {
            self.elapsed_ms
        }
    }

    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.total_time_ms - self.live_elapsed_ms(now_ms)).max(0)
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.is_running && self.live_elapsed_ms(now_ms) >= self.total_time_ms
    }

    /// Returns `false` if already running.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.is_running {
            return false;
        }
        self.is_running = true;
        self.started_at = now_ms;
        true
    }

    /// Returns `false` if not running.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if !self.is_running {
            return false;
        }
        self.elapsed_ms = self.live_elapsed_ms(now_ms);
        self.is_running = false;
        self.started_at = 0;
        true
    }

    /// Move to the next phase, stopped and with a fresh clock. Returns the
    /// phase that was left.
    pub fn advance(&mut self) -> PomodoroPhase {
        let from = self.phase;
        self.phase = match from {
            PomodoroPhase::Work => {
                self.work_count += 1;
                if self.work_count % WORK_PHASES_PER_LONG_BREAK == 0 {
                    PomodoroPhase::Long
                } else {
                    PomodoroPhase::Short
                }
            }
            PomodoroPhase::Short => PomodoroPhase::Work,
            PomodoroPhase::Long => {
                self.work_count = 0;
                PomodoroPhase::Work
            }
        };
        self.is_running = false;
        self.started_at = 0;
        self.elapsed_ms = 0;
        self.total_time_ms = self.phase.duration_ms();
        from
    }
}
