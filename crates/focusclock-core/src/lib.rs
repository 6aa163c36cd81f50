//! # focusclock Core Library
//!
//! The time-tracking and focus-timer engine behind focusclock. Several
//! execution contexts (processes, windows, tabs) may run at once against the
//! same shared store; exactly one of them ticks at a time and the others
//! follow its state through the store's change feed.
//!
//! ## Architecture
//!
//! - **Clock**: injectable wall-clock source; all elapsed time is `now - start`
//! - **Storage**: a [`SharedStore`] trait with an in-process
//!   ([`MemoryStore`]) and an SQLite ([`SqliteStore`]) transport, plus
//!   TOML-based [`Config`]
//! - **Timer**: the [`LeaderTicker`], the session/Pomodoro [`TimerEngine`] and
//!   the cross-context [`Reconciler`]
//! - **Stats**: read-only day/week/month [`Report`]s
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: public timer operations and per-tick work
//! - [`LeaderTicker`]: 1 Hz heartbeat-based leader
//! - [`Report`]: derived totals
//! - [`TrackerEvent`]: what every operation reports back

pub mod clock;
pub mod error;
pub mod events;
pub mod stats;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, StoreError};
pub use events::TrackerEvent;
pub use stats::{Period, PeriodReport, Report};
pub use storage::{Config, MemoryStore, SharedStore, SqliteStore, StorageEvent};
pub use timer::{
    Category, LeaderTicker, PomodoroPhase, PomodoroState, Reconciler, RunningSession, SessionKind,
    TimeSession, TimerEngine,
};
