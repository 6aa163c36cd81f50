pub mod config;
pub mod pomodoro;
pub mod run;
pub mod stats;
pub mod timer;

use std::sync::Arc;

use focusclock_core::{Config, SqliteStore, SystemClock, TimerEngine};
use serde::Serialize;

/// Open this process as one execution context on the shared database.
pub fn open_engine() -> Result<(TimerEngine, Config), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let store = SqliteStore::open_default(&config.persistence.database_file)?;
    let engine = TimerEngine::new(Arc::new(SystemClock), Arc::new(store), &config);
    Ok((engine, config))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
