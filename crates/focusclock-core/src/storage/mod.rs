//! Shared persistent store and configuration.
//!
//! Every execution context sees the same key/value space through a
//! [`SharedStore`]. Writes made by one context are reported to every *other*
//! context through [`SharedStore::drain_changes`]; a context never observes
//! its own writes there.

mod config;
pub mod database;
pub mod memory;

pub use config::{Config, PersistenceConfig, TickerConfig};
pub use database::SqliteStore;
pub use memory::{MemoryStore, MemoryStoreHandle};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::StoreError;

/// Keys of the records the tracker keeps in the shared store.
pub mod keys {
    /// Completed sessions: `{ sessions, lastUpdated }`.
    pub const SESSIONS: &str = "focusclock.sessions";
    /// The running session, absent when idle.
    pub const RUNNING: &str = "focusclock.running";
    /// Pomodoro state, serialized directly.
    pub const POMODORO: &str = "focusclock.pomodoro";
    /// Bare epoch-ms string written by the leader on every tick.
    pub const HEARTBEAT: &str = "focusclock.heartbeat";
}

/// A change made by another context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Key/value store shared between execution contexts.
pub trait SharedStore: Send + Sync {
    /// Identifier of this context; unique among everything attached to the store.
    fn context_id(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Changes written by other contexts since the previous call, oldest first.
    fn drain_changes(&self) -> Result<Vec<StorageEvent>, StoreError>;
}

/// Returns the focusclock data directory, creating it if needed.
///
/// `FOCUSCLOCK_DATA_DIR` wins when set. Otherwise `~/.config/focusclock`, or
/// `~/.config/focusclock-dev` when `FOCUSCLOCK_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("FOCUSCLOCK_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSCLOCK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusclock-dev")
            } else {
                base_dir.join("focusclock")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
