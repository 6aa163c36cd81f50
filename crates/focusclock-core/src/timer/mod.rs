mod engine;
mod pomodoro;
mod reconcile;
mod records;
mod session;
mod ticker;

pub use engine::TimerEngine;
pub use pomodoro::{
    PomodoroPhase, PomodoroState, LONG_BREAK_MS, SHORT_BREAK_MS, WORK_MS,
    WORK_PHASES_PER_LONG_BREAK,
};
pub use reconcile::{Reconciler, RemoteChange};
pub use records::{RunningRecord, SessionsRecord};
pub use session::{Category, RunningSession, SessionKind, TimeSession};
pub use ticker::{LeaderTicker, PollOutcome, Subscription, Tick};
