//! Session and Pomodoro engine.
//!
//! The engine is a wall-clock-based state machine. It does not use internal
//! threads: the caller invokes [`TimerEngine::poll`] periodically, which
//! merges remote changes and, when this context leads, runs the tick.
//!
//! ## Session states
//!
//! ```text
//! Idle -> Running -> Paused -> Running ...
//!            \          \
//!             `-> Idle   `-> Idle (reset)
//! ```
//!
//! Pomodoro phases run on top of sessions: every Pomodoro operation drives
//! the matching session operation so Pomodoro time is also ordinary tracked
//! time.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(clock, store, &config);
//! engine.start_timer(SessionKind::Focus);
//! // In a loop, roughly once per tick interval:
//! for event in engine.poll() { /* ... */ }
//! ```

use chrono::{DateTime, FixedOffset};
use std::sync::Arc;

use super::pomodoro::PomodoroState;
use super::reconcile::{Reconciler, RemoteChange};
use super::records::{decode, encode, RunningRecord, SessionsRecord};
use super::session::{RunningSession, SessionKind, TimeSession};
use super::ticker::{LeaderTicker, PollOutcome, Subscription, Tick};
use crate::clock::Clock;
use crate::events::TrackerEvent;
use crate::stats::Report;
use crate::storage::{keys, Config, PersistenceConfig, SharedStore};

pub struct TimerEngine {
    clock: Arc<dyn Clock>,
    store: Arc<dyn SharedStore>,
    ticker: LeaderTicker,
    config: PersistenceConfig,
    reconciler: Reconciler,
    running: Option<RunningSession>,
    paused: bool,
    paused_kind: SessionKind,
    history: Vec<TimeSession>,
    pomodoro: PomodoroState,
    last_persist_ms: Option<i64>,
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("ticker", &self.ticker)
            .field("running", &self.running)
            .field("paused", &self.paused)
            .field("history_len", &self.history.len())
            .field("pomodoro", &self.pomodoro)
            .finish()
    }
}

impl TimerEngine {
    /// Build an engine for one execution context and recover whatever the
    /// shared store holds.
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn SharedStore>, config: &Config) -> Self {
        let ticker = LeaderTicker::new(Arc::clone(&clock), Arc::clone(&store), config.ticker.clone());
        Self::with_ticker(clock, store, ticker, config.persistence.clone())
    }

    /// Like [`TimerEngine::new`] with a caller-built ticker.
    pub fn with_ticker(
        clock: Arc<dyn Clock>,
        store: Arc<dyn SharedStore>,
        ticker: LeaderTicker,
        config: PersistenceConfig,
    ) -> Self {
        let mut engine = Self {
            clock,
            store,
            ticker,
            reconciler: Reconciler::new(config.reconcile_guard_ms),
            config,
            running: None,
            paused: false,
            paused_kind: SessionKind::Focus,
            history: Vec::new(),
            pomodoro: PomodoroState::default(),
            last_persist_ms: None,
        };
        engine.restore();
        engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_leader(&self) -> bool {
        self.ticker.is_active()
    }

    pub fn running_session(&self) -> Option<&RunningSession> {
        self.running.as_ref()
    }

    pub fn pomodoro(&self) -> &PomodoroState {
        &self.pomodoro
    }

    pub fn history(&self) -> &[TimeSession] {
        &self.history
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now()
    }

    /// Read-only reporting view as of now.
    pub fn report(&self) -> Report<'_> {
        Report::new(&self.history, self.running.as_ref(), self.clock.now())
    }

    pub fn today_minutes(&self) -> u64 {
        self.report().today_minutes()
    }

    pub fn week_minutes(&self) -> u64 {
        self.report().week_minutes()
    }

    pub fn month_minutes(&self) -> u64 {
        self.report().month_minutes()
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> TrackerEvent {
        let now = self.clock.now();
        let mut running = self.running.clone();
        if let Some(session) = running.as_mut() {
            session.refresh(now);
        }
        TrackerEvent::StateSnapshot {
            is_running: self.is_running(),
            is_paused: self.paused,
            is_leader: self.is_leader(),
            running_session: running,
            pomodoro: self.pomodoro.clone(),
            pomodoro_remaining_ms: self.pomodoro.remaining_ms(now.timestamp_millis()),
            today_minutes: self.today_minutes(),
            at: now,
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&Tick) + Send + 'static) -> Subscription {
        self.ticker.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.ticker.unsubscribe(subscription)
    }

    // ── Session commands ─────────────────────────────────────────────

    /// Start tracking. Does nothing if a session is already running.
    pub fn start_timer(&mut self, kind: SessionKind) -> Vec<TrackerEvent> {
        if self.running.is_some() {
            return Vec::new();
        }
        let now = self.clock.now();
        let session = RunningSession::begin(kind, now);
        let resumed = std::mem::replace(&mut self.paused, false);
        let event = if resumed {
            TrackerEvent::TimerResumed {
                session_id: session.id.clone(),
                kind,
                at: now,
            }
        } else {
            TrackerEvent::TimerStarted {
                session_id: session.id.clone(),
                kind,
                at: now,
            }
        };
        tracing::debug!(session = %session.id, ?kind, resumed, "session started");
        self.running = Some(session);
        self.ticker.force_start();
        self.persist(now, true);
        vec![event]
    }

    /// Pause a running session, or resume a paused one.
    pub fn pause_timer(&mut self) -> Vec<TrackerEvent> {
        if self.running.is_none() {
            if self.paused {
                return self.start_timer(self.paused_kind);
            }
            return Vec::new();
        }
        let now = self.clock.now();
        let mut events = Vec::new();
        self.paused_kind = self
            .running
            .as_ref()
            .map(|s| s.kind)
            .unwrap_or_default();
        let completed = self.close_running(now, &mut events);
        self.paused = true;
        self.stop_ticker_if_idle();
        self.persist(now, true);
        events.push(TrackerEvent::TimerPaused { completed, at: now });
        events
    }

    /// Close any running session and go fully idle.
    pub fn reset_timer(&mut self) -> Vec<TrackerEvent> {
        if self.running.is_none() && !self.paused {
            return Vec::new();
        }
        let now = self.clock.now();
        let mut events = Vec::new();
        let completed = self.close_running(now, &mut events);
        self.paused = false;
        self.stop_ticker_if_idle();
        self.persist(now, true);
        events.push(TrackerEvent::TimerReset { completed, at: now });
        events
    }

    // ── Pomodoro commands ────────────────────────────────────────────

    pub fn start_pomodoro_timer(&mut self) -> Vec<TrackerEvent> {
        if self.pomodoro.is_running {
            return Vec::new();
        }
        let now = self.clock.now();
        let kind = self.pomodoro.phase.session_kind();
        let mut events = Vec::new();

        if self.running.as_ref().is_some_and(|s| s.kind != kind) {
            events.extend(self.reset_timer());
        }
        self.pomodoro.start(now.timestamp_millis());
        events.push(TrackerEvent::PomodoroStarted {
            phase: self.pomodoro.phase,
            remaining_ms: self.pomodoro.remaining_ms(now.timestamp_millis()),
            at: now,
        });
        tracing::debug!(phase = ?self.pomodoro.phase, "pomodoro started");

        if self.running.is_some() {
            self.ticker.force_start();
        } else {
            self.paused = false;
            events.extend(self.start_timer(kind));
        }
        self.persist(now, true);
        events
    }

    pub fn pause_pomodoro_timer(&mut self) -> Vec<TrackerEvent> {
        let now = self.clock.now();
        if !self.pomodoro.pause(now.timestamp_millis()) {
            return Vec::new();
        }
        let mut events = vec![TrackerEvent::PomodoroPaused {
            phase: self.pomodoro.phase,
            elapsed_ms: self.pomodoro.elapsed_ms,
            at: now,
        }];
        if self.running.is_some() {
            events.extend(self.pause_timer());
        } else {
            self.stop_ticker_if_idle();
            self.persist(now, true);
        }
        events
    }

    /// Back to the first work phase, and close the tracked session.
    pub fn reset_pomodoro_timer(&mut self) -> Vec<TrackerEvent> {
        let now = self.clock.now();
        self.pomodoro = PomodoroState::default();
        let mut events = vec![TrackerEvent::PomodoroReset { at: now }];
        events.extend(self.reset_timer());
        self.stop_ticker_if_idle();
        self.persist(now, true);
        events
    }

    /// End the current phase early. Counts as a completion for the cycle.
    pub fn skip_pomodoro_phase(&mut self) -> Vec<TrackerEvent> {
        let now = self.clock.now();
        let mut events = self.reset_timer();
        let from = self.pomodoro.advance();
        events.push(TrackerEvent::PhaseSkipped {
            from,
            to: self.pomodoro.phase,
            at: now,
        });
        self.stop_ticker_if_idle();
        self.persist(now, true);
        events
    }

    // ── Driving ──────────────────────────────────────────────────────

    /// Merge remote changes, take over if there is work and no live leader,
    /// then let the ticker run a due check or tick.
    pub fn poll(&mut self) -> Vec<TrackerEvent> {
        let mut events = self.reconcile();
        if self.has_work() && self.ticker.claim_if_orphaned() {
            events.push(TrackerEvent::LeadershipAcquired {
                at: self.clock.now(),
            });
        }
        match self.ticker.poll() {
            PollOutcome::Ticked(tick) => events.extend(self.on_tick(tick.at)),
            PollOutcome::Yielded {
                foreign_heartbeat_ms,
            } => events.push(TrackerEvent::LeadershipLost {
                foreign_heartbeat_ms,
                at: self.clock.now(),
            }),
            PollOutcome::Idle | PollOutcome::Waiting => {}
        }
        events
    }

    /// Per-tick work, in order: Pomodoro completion, elapsed and midnight
    /// split, throttled persist.
    fn on_tick(&mut self, now: DateTime<FixedOffset>) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        let now_ms = now.timestamp_millis();

        if self.pomodoro.is_due(now_ms) {
            self.close_running(now, &mut events);
            self.paused = false;
            let from = self.pomodoro.advance();
            tracing::info!(?from, to = ?self.pomodoro.phase, "pomodoro phase completed");
            events.push(TrackerEvent::PhaseCompleted {
                from,
                to: self.pomodoro.phase,
                work_count: self.pomodoro.work_count,
                at: now,
            });
        }

        self.split_if_past_midnight(now, &mut events);
        if let Some(session) = self.running.as_mut() {
            session.refresh(now);
        }

        self.stop_ticker_if_idle();
        self.persist(now, !events.is_empty());
        events
    }

    fn reconcile(&mut self) -> Vec<TrackerEvent> {
        let changes = match self.store.drain_changes() {
            Ok(changes) => changes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read remote changes");
                return Vec::new();
            }
        };
        if changes.is_empty() {
            return Vec::new();
        }
        let now = self.clock.now();
        if !self.reconciler.accepts(now.timestamp_millis()) {
            tracing::debug!(count = changes.len(), "ignoring remote changes right after local write");
            return Vec::new();
        }

        let mut events = Vec::new();
        for change in &changes {
            let Some(remote) = self.reconciler.interpret(change, now) else {
                continue;
            };
            self.apply_remote(remote);
            events.push(TrackerEvent::RemoteApplied {
                key: change.key.clone(),
                at: now,
            });
        }
        events
    }

    fn apply_remote(&mut self, change: RemoteChange) {
        match change {
            RemoteChange::Pomodoro(state) => self.pomodoro = state,
            RemoteChange::Running(session) => {
                tracing::debug!(session = %session.id, leader = self.is_leader(), "adopted remote session");
                self.running = Some(session);
                self.paused = false;
            }
            RemoteChange::Stopped {
                is_paused,
                paused_kind,
            } => {
                self.running = None;
                self.paused = is_paused;
                self.paused_kind = paused_kind;
            }
            RemoteChange::History(sessions) => self.history = sessions,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Load persisted state. Anything unreadable falls back to defaults.
    fn restore(&mut self) {
        if let Some(record) = self.load::<SessionsRecord>(keys::SESSIONS) {
            self.history = record.sessions;
        }
        if let Some(state) = self.load::<PomodoroState>(keys::POMODORO) {
            self.pomodoro = state;
        }
        if let Some(record) = self.load::<RunningRecord>(keys::RUNNING) {
            match record.running_session {
                Some(mut session) if record.is_running => {
                    session.refresh(self.clock.now());
                    tracing::info!(
                        session = %session.id,
                        elapsed_seconds = session.elapsed_seconds,
                        "recovered running session"
                    );
                    self.running = Some(session);
                }
                _ => {
                    self.paused = record.is_paused;
                    self.paused_kind = record.paused_kind;
                }
            }
        }
        if self.has_work() {
            self.ticker.force_start();
        }
    }

    fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key) {
            Ok(Some(raw)) => decode(key, &raw),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read stored record");
                None
            }
        }
    }

    /// Complete the running session at `now` (splitting at midnight first)
    /// and append it. Returns the appended session.
    fn close_running(
        &mut self,
        now: DateTime<FixedOffset>,
        events: &mut Vec<TrackerEvent>,
    ) -> Option<TimeSession> {
        self.split_if_past_midnight(now, events);
        let session = self.running.take()?;
        let completed = session.complete(now);
        match &completed {
            Some(done) => self.append_history(done.clone(), now),
            None => tracing::debug!(session = %session.id, "dropping zero-length session"),
        }
        completed
    }

    fn split_if_past_midnight(&mut self, now: DateTime<FixedOffset>, events: &mut Vec<TrackerEvent>) {
        let Some((closed, continued)) = self
            .running
            .as_ref()
            .and_then(|s| s.split_at_midnight(now))
        else {
            return;
        };
        tracing::info!(
            closed = closed.as_ref().map(|s| s.id.as_str()),
            continued = %continued.id,
            "split session at midnight"
        );
        events.push(TrackerEvent::SessionSplit {
            closed: closed.clone(),
            continued_id: continued.id.clone(),
            at: now,
        });
        self.running = Some(continued);
        if let Some(closed) = closed {
            self.append_history(closed, now);
        }
    }

    fn append_history(&mut self, session: TimeSession, now: DateTime<FixedOffset>) {
        self.history.push(session);
        let record = SessionsRecord {
            sessions: self.history.clone(),
            last_updated: now.timestamp_millis(),
        };
        if let Some(json) = encode(keys::SESSIONS, &record) {
            self.write(keys::SESSIONS, Some(&json));
        }
        self.reconciler.note_local_write(now.timestamp_millis());
    }

    /// Something needs ticks: a running session or a running Pomodoro phase.
    fn has_work(&self) -> bool {
        self.running.is_some() || self.pomodoro.is_running
    }

    fn stop_ticker_if_idle(&mut self) {
        if !self.has_work() && self.ticker.is_active() {
            self.ticker.stop();
        }
    }

    /// Write the running and Pomodoro records. Unforced writes are throttled.
    fn persist(&mut self, now: DateTime<FixedOffset>, force: bool) {
        let now_ms = now.timestamp_millis();
        if !force {
            let throttle = i64::try_from(self.config.throttle_ms).unwrap_or(i64::MAX);
            if self
                .last_persist_ms
                .is_some_and(|last| now_ms - last < throttle)
            {
                return;
            }
        }

        if self.running.is_some() || self.paused {
            let record = RunningRecord {
                is_running: self.running.is_some(),
                is_paused: self.paused,
                running_session: self.running.clone(),
                paused_kind: self.paused_kind,
                last_saved: now_ms,
            };
            if let Some(json) = encode(keys::RUNNING, &record) {
                self.write(keys::RUNNING, Some(&json));
            }
        } else {
            self.write(keys::RUNNING, None);
        }
        if let Some(json) = encode(keys::POMODORO, &self.pomodoro) {
            self.write(keys::POMODORO, Some(&json));
        }

        self.last_persist_ms = Some(now_ms);
        self.reconciler.note_local_write(now_ms);
    }

    fn write(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(v) => self.store.set(key, v),
            None => self.store.remove(key),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "failed to persist record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::timer::{Category, PomodoroPhase};
    use crate::timer::pomodoro::{SHORT_BREAK_MS, WORK_MS};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn engine_at(clock: &ManualClock) -> (TimerEngine, MemoryStore) {
        let store = MemoryStore::new();
        let engine = TimerEngine::new(
            Arc::new(clock.clone()),
            Arc::new(store.context()),
            &Config::default(),
        );
        (engine, store)
    }

    fn poll_for(engine: &mut TimerEngine, clock: &ManualClock, secs: i64) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        for _ in 0..secs {
            clock.advance_secs(1);
            events.extend(engine.poll());
        }
        events
    }

    #[test]
    fn start_pause_resume() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        assert!(!engine.is_running());

        assert_eq!(engine.start_timer(SessionKind::Focus).len(), 1);
        assert!(engine.is_running());
        assert!(engine.is_leader());
        assert!(engine.start_timer(SessionKind::Focus).is_empty());

        clock.advance_secs(60);
        engine.pause_timer();
        assert!(!engine.is_running());
        assert!(engine.is_paused());
        assert!(!engine.is_leader());

        let events = engine.pause_timer();
        assert!(matches!(events[0], TrackerEvent::TimerResumed { .. }));
        assert!(engine.is_running());
        assert!(!engine.is_paused());
    }

    #[test]
    fn pause_after_1500_seconds_records_25_minutes() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);
        clock.advance_secs(1500);
        engine.pause_timer();

        assert_eq!(engine.history().len(), 1);
        let done = &engine.history()[0];
        assert_eq!(done.duration, 1500);
        assert_eq!(done.category, Category::Focus);
        assert_eq!(engine.today_minutes(), 25);
    }

    #[test]
    fn pause_conserves_tracked_time() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);
        poll_for(&mut engine, &clock, 437);

        let before = engine.report().today_minutes();
        let live = engine.running_session().unwrap().live_elapsed(clock.now());
        engine.pause_timer();
        assert_eq!(engine.history()[0].duration, live);
        assert_eq!(engine.report().today_minutes(), before);
    }

    #[test]
    fn reset_leaves_engine_idle() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, store) = engine_at(&clock);
        engine.start_timer(SessionKind::ShortBreak);
        clock.advance_secs(30);
        let events = engine.reset_timer();
        assert!(matches!(&events[0], TrackerEvent::TimerReset { completed: Some(s), .. } if s.category == Category::Breaks));
        assert!(!engine.is_running());
        assert!(!engine.is_paused());
        assert!(store.peek(keys::RUNNING).is_none());
        assert!(engine.pause_timer().is_empty());
        assert!(engine.reset_timer().is_empty());
    }

    #[test]
    fn midnight_split_conserves_time() {
        let clock = ManualClock::at_utc(2025, 6, 2, 23, 50, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);

        let events = poll_for(&mut engine, &clock, 15 * 60);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TrackerEvent::SessionSplit { .. }))
                .count(),
            1
        );

        let closed = &engine.history()[0];
        assert_eq!(closed.duration, 600);
        let running = engine.running_session().unwrap();
        assert_eq!(running.start_time, closed.end_time);
        assert_eq!(running.category, Category::Focus);
        assert_eq!(
            closed.duration + running.live_elapsed(clock.now()),
            15 * 60
        );
        assert_eq!(engine.today_minutes(), 5);
    }

    #[test]
    fn split_happens_for_start_in_last_second_before_midnight() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 23, 59, 59).unwrap() + Duration::milliseconds(600);
        let clock = ManualClock::new(start.fixed_offset());
        let (mut engine, _store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);

        let events = poll_for(&mut engine, &clock, 600);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TrackerEvent::SessionSplit { .. }))
                .count(),
            1
        );
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history()[0].duration, 1);
        let running = engine.running_session().unwrap();
        assert_eq!(
            running.start_time,
            Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(engine.today_minutes(), 9);
    }

    #[test]
    fn pomodoro_completion_stops_and_records_focus() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_pomodoro_timer();
        assert!(engine.pomodoro().is_running);
        assert_eq!(engine.running_session().unwrap().kind, SessionKind::Focus);

        let events = poll_for(&mut engine, &clock, WORK_MS / 1000);
        assert!(events.iter().any(|e| matches!(
            e,
            TrackerEvent::PhaseCompleted {
                from: PomodoroPhase::Work,
                to: PomodoroPhase::Short,
                ..
            }
        )));
        assert!(!engine.pomodoro().is_running);
        assert_eq!(engine.pomodoro().phase, PomodoroPhase::Short);
        assert_eq!(engine.pomodoro().total_time_ms, SHORT_BREAK_MS);
        assert!(!engine.is_running());
        assert!(!engine.is_leader());
        assert_eq!(engine.history()[0].duration, WORK_MS / 1000);

        engine.start_pomodoro_timer();
        assert_eq!(engine.running_session().unwrap().kind, SessionKind::ShortBreak);
    }

    #[test]
    fn pomodoro_pause_excludes_paused_time() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_pomodoro_timer();
        clock.advance_secs(600);
        engine.pause_pomodoro_timer();
        assert!(engine.is_paused());
        assert_eq!(engine.pomodoro().elapsed_ms, 600_000);

        clock.advance_secs(3600);
        engine.start_pomodoro_timer();
        assert!(engine.is_running());
        clock.advance_secs(60);
        assert_eq!(engine.pomodoro().live_elapsed_ms(clock.now_ms()), 660_000);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn skip_and_reset_pomodoro() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_pomodoro_timer();
        clock.advance_secs(120);
        let events = engine.skip_pomodoro_phase();
        assert!(events.iter().any(|e| matches!(e, TrackerEvent::PhaseSkipped { .. })));
        assert_eq!(engine.pomodoro().phase, PomodoroPhase::Short);
        assert_eq!(engine.pomodoro().work_count, 1);
        assert!(!engine.is_running());
        assert_eq!(engine.history().len(), 1);

        engine.start_pomodoro_timer();
        clock.advance_secs(10);
        engine.reset_pomodoro_timer();
        assert_eq!(engine.pomodoro(), &PomodoroState::default());
        assert!(!engine.is_running());
        assert!(!engine.is_leader());
        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn starting_pomodoro_closes_session_of_other_kind() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_timer(SessionKind::LongBreak);
        clock.advance_secs(90);
        engine.start_pomodoro_timer();
        assert_eq!(engine.history()[0].category, Category::Breaks);
        assert_eq!(engine.running_session().unwrap().kind, SessionKind::Focus);
    }

    #[test]
    fn tick_persistence_is_throttled() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);
        let first = store.peek(keys::RUNNING).unwrap();

        clock.advance_secs(1);
        engine.poll();
        assert_eq!(store.peek(keys::RUNNING).unwrap(), first);

        clock.advance_secs(1);
        engine.poll();
        assert_ne!(store.peek(keys::RUNNING).unwrap(), first);
    }

    #[test]
    fn remote_write_inside_guard_window_is_dropped() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);
        let other = store.context();

        clock.advance_ms(50);
        other.remove(keys::RUNNING).unwrap();
        let events = engine.poll();
        assert!(!events.iter().any(|e| matches!(e, TrackerEvent::RemoteApplied { .. })));
        assert!(engine.is_running());

        clock.advance_ms(100);
        let remote = PomodoroState {
            work_count: 2,
            ..PomodoroState::default()
        };
        other
            .set(keys::POMODORO, &serde_json::to_string(&remote).unwrap())
            .unwrap();
        let events = engine.poll();
        assert!(events.iter().any(|e| matches!(
            e,
            TrackerEvent::RemoteApplied { key, .. } if key == keys::POMODORO
        )));
        assert_eq!(engine.pomodoro().work_count, 2);
        assert!(engine.is_running());
    }

    #[test]
    fn idle_context_takes_over_work_left_by_dropped_one() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut runner, store) = engine_at(&clock);

        let mut oneshot = TimerEngine::new(
            Arc::new(clock.clone()),
            Arc::new(store.context()),
            &Config::default(),
        );
        oneshot.start_pomodoro_timer();
        drop(oneshot);
        assert!(store.peek(keys::HEARTBEAT).is_none());

        let events = runner.poll();
        assert!(events.iter().any(|e| matches!(e, TrackerEvent::LeadershipAcquired { .. })));
        assert!(runner.is_leader());
        assert!(runner.pomodoro().is_running);

        let events = poll_for(&mut runner, &clock, WORK_MS / 1000);
        assert!(events.iter().any(|e| matches!(e, TrackerEvent::PhaseCompleted { .. })));
        assert_eq!(runner.pomodoro().phase, PomodoroPhase::Short);
        assert!(!runner.pomodoro().is_running);
        assert_eq!(runner.today_minutes(), 25);
    }

    #[test]
    fn corrupt_store_falls_back_to_defaults() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let store = MemoryStore::new();
        let writer = store.context();
        writer.set(keys::SESSIONS, "not json").unwrap();
        writer.set(keys::RUNNING, "{\"isRunning\":").unwrap();
        writer.set(keys::POMODORO, "[]").unwrap();

        let engine = TimerEngine::new(
            Arc::new(clock.clone()),
            Arc::new(store.context()),
            &Config::default(),
        );
        assert!(engine.history().is_empty());
        assert!(!engine.is_running());
        assert_eq!(engine.pomodoro(), &PomodoroState::default());
    }

    #[test]
    fn snapshot_reports_live_elapsed() {
        let clock = ManualClock::at_utc(2025, 6, 2, 9, 0, 0).unwrap();
        let (mut engine, _store) = engine_at(&clock);
        engine.start_timer(SessionKind::Focus);
        clock.advance_secs(125);
        match engine.snapshot() {
            TrackerEvent::StateSnapshot {
                is_running,
                running_session,
                today_minutes,
                ..
            } => {
                assert!(is_running);
                assert_eq!(running_session.unwrap().elapsed_seconds, 125);
                assert_eq!(today_minutes, 2);
            }
            other => panic!("Expected StateSnapshot, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn elapsed_is_monotonic(steps in proptest::collection::vec(0i64..5_000, 1..30)) {
            let clock = ManualClock::at_utc(2025, 6, 2, 8, 0, 0).unwrap();
            let (mut engine, _store) = engine_at(&clock);
            engine.start_timer(SessionKind::Focus);
            let mut last = 0;
            for step in steps {
                clock.advance_ms(step);
                engine.poll();
                let elapsed = engine.running_session().unwrap().live_elapsed(clock.now());
                prop_assert!(elapsed >= last);
                last = elapsed;
            }
        }
    }
}
