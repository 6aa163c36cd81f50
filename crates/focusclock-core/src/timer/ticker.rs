//! Leader ticker.
//!
//! One ticker lives in each execution context. While active it fires a tick
//! once per interval, writing a heartbeat to the shared store each time.
//! Leadership is last-writer-wins: every check interval the ticker compares
//! the stored heartbeat with the last one it wrote itself, and if someone
//! else's is newer by more than the slack, it goes quiet. Subscriptions stay
//! registered so a later [`LeaderTicker::force_start`] picks them up again.
//!
//! A quiet ticker takes over through [`LeaderTicker::claim_if_orphaned`] once
//! the heartbeat is gone or older than one check interval. Stopping or
//! dropping a ticker removes the heartbeat only if it is still its own.
//!
//! Like the rest of the engine the ticker has no thread of its own: the owner
//! calls [`LeaderTicker::poll`] at least once per interval, and all timing is
//! a comparison against the injected clock.

use chrono::{DateTime, FixedOffset};
use std::sync::Arc;

use crate::clock::Clock;
use crate::storage::{keys, SharedStore, TickerConfig};

/// One tick as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub at: DateTime<FixedOffset>,
    /// Ticks fired by this ticker since it was created.
    pub seq: u64,
}

/// Handle returned by [`LeaderTicker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type TickCallback = Box<dyn FnMut(&Tick) + Send>;

/// What one call to [`LeaderTicker::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Waiting,
    Ticked(Tick),
    /// Another context's heartbeat won; this ticker stopped.
    Yielded { foreign_heartbeat_ms: i64 },
}

pub struct LeaderTicker {
    clock: Arc<dyn Clock>,
    store: Arc<dyn SharedStore>,
    config: TickerConfig,
    active: bool,
    last_tick_ms: i64,
    next_check_ms: i64,
    /// Last heartbeat this context wrote; `None` before the first tick.
    last_written_ms: Option<i64>,
    seq: u64,
    next_subscription: u64,
    subscribers: Vec<(Subscription, TickCallback)>,
}

impl std::fmt::Debug for LeaderTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderTicker")
            .field("context", &self.store.context_id())
            .field("active", &self.active)
            .field("last_written_ms", &self.last_written_ms)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl LeaderTicker {
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn SharedStore>, config: TickerConfig) -> Self {
        Self {
            clock,
            store,
            config,
            active: false,
            last_tick_ms: 0,
            next_check_ms: 0,
            last_written_ms: None,
            seq: 0,
            next_subscription: 0,
            subscribers: Vec::new(),
        }
    }

    /// Whether this context currently runs the interval.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_written_heartbeat(&self) -> Option<i64> {
        self.last_written_ms
    }

    pub fn start(&mut self) {
        if self.active {
            return;
        }
        let now = self.clock.now_ms();
        self.active = true;
        self.last_tick_ms = now;
        self.next_check_ms = now + self.check_interval_ms();
        self.write_heartbeat(now);
        tracing::debug!(context = %self.store.context_id(), "ticker started");
    }

    /// Take over regardless of local state.
    pub fn force_start(&mut self) {
        self.active = false;
        self.start();
    }

    /// Stop ticking and clear our heartbeat. Safe to call when already stopped.
    pub fn stop(&mut self) {
        self.active = false;
        let Some(ours) = self.last_written_ms else {
            return;
        };
        if self.stored_heartbeat() != Some(ours) {
            return;
        }
        if let Err(e) = self.store.remove(keys::HEARTBEAT) {
            tracing::warn!(error = %e, "failed to clear heartbeat");
        }
    }

    /// Start ticking if nobody else is: the heartbeat is missing or has not
    /// been refreshed for a full check interval. Returns whether we took over.
    pub fn claim_if_orphaned(&mut self) -> bool {
        if self.active {
            return false;
        }
        let now_ms = self.clock.now_ms();
        let orphaned = match self.store.get(keys::HEARTBEAT) {
            Ok(Some(raw)) => raw
                .trim()
                .parse::<i64>()
                .map_or(true, |beat| now_ms - beat > self.check_interval_ms()),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read heartbeat");
                return false;
            }
        };
        if orphaned {
            self.force_start();
            tracing::info!(context = %self.store.context_id(), "no live leader, taking over");
        }
        orphaned
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&Tick) + Send + 'static) -> Subscription {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((subscription, Box::new(callback)));
        subscription
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(s, _)| *s != subscription);
        self.subscribers.len() != before
    }

    /// Drive the ticker: run a due leadership check, then a due tick.
    ///
    /// At most one tick fires per call, however long the caller was away.
    pub fn poll(&mut self) -> PollOutcome {
        if !self.active {
            return PollOutcome::Idle;
        }
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        if now_ms >= self.next_check_ms {
            self.next_check_ms = now_ms + self.check_interval_ms();
            if let Some(foreign) = self.foreign_leader() {
                self.active = false;
                tracing::info!(
                    context = %self.store.context_id(),
                    foreign_heartbeat_ms = foreign,
                    "newer heartbeat observed, yielding leadership"
                );
                return PollOutcome::Yielded {
                    foreign_heartbeat_ms: foreign,
                };
            }
        }

        if now_ms - self.last_tick_ms < self.tick_interval_ms() {
            return PollOutcome::Waiting;
        }
        self.last_tick_ms = now_ms;
        self.seq += 1;
        self.write_heartbeat(now_ms);

        let tick = Tick { at: now, seq: self.seq };
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&tick);
        }
        PollOutcome::Ticked(tick)
    }

    fn write_heartbeat(&mut self, now_ms: i64) {
        match self.store.set(keys::HEARTBEAT, &now_ms.to_string()) {
            Ok(()) => self.last_written_ms = Some(now_ms),
            Err(e) => tracing::warn!(error = %e, "failed to write heartbeat"),
        }
    }

    fn stored_heartbeat(&self) -> Option<i64> {
        match self.store.get(keys::HEARTBEAT) {
            Ok(raw) => raw?.trim().parse::<i64>().ok(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read heartbeat");
                None
            }
        }
    }

    /// Heartbeat written by another context that beats ours by more than the slack.
    fn foreign_leader(&self) -> Option<i64> {
        let stored = self.stored_heartbeat()?;
        let ours = self.last_written_ms.unwrap_or(0);
        let slack = i64::try_from(self.config.heartbeat_slack_ms).unwrap_or(i64::MAX);
        (stored - ours > slack).then_some(stored)
    }

    fn tick_interval_ms(&self) -> i64 {
        i64::try_from(self.config.tick_interval_ms).unwrap_or(i64::MAX)
    }

    fn check_interval_ms(&self) -> i64 {
        i64::try_from(self.config.leader_check_interval_ms).unwrap_or(i64::MAX)
    }
}

impl Drop for LeaderTicker {
    fn drop(&mut self) {
        if self.active {
            self.stop();
        }
    }
}
