//! Foreground execution context.
//!
//! Polls the engine once per tick interval and prints every event as one
//! JSON line. Several `run` processes on the same data directory elect one
//! leader between them; the others print the remote changes they merge.

use std::time::Duration;

use focusclock_core::TimerEngine;
use tokio::time::MissedTickBehavior;

use super::open_engine;

pub fn run(ticks: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let (mut engine, config) = open_engine()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(drive(&mut engine, config.ticker.tick_interval(), ticks))
}

async fn drive(
    engine: &mut TimerEngine,
    period: Duration,
    ticks: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string(&engine.snapshot())?);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut elapsed = 0u64;
    while ticks.map_or(true, |limit| elapsed < limit) {
        interval.tick().await;
        for event in engine.poll() {
            println!("{}", serde_json::to_string(&event)?);
        }
        elapsed += 1;
    }
    tracing::debug!(ticks = elapsed, "run loop finished");
    Ok(())
}
