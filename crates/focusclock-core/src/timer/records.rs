//! JSON records kept in the shared store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::session::{RunningSession, SessionKind, TimeSession};

/// Stored under [`keys::SESSIONS`](crate::storage::keys::SESSIONS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsRecord {
    pub sessions: Vec<TimeSession>,
    pub last_updated: i64,
}

/// Stored under [`keys::RUNNING`](crate::storage::keys::RUNNING) while a
/// session runs or is paused; removed when idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningRecord {
    pub is_running: bool,
    pub is_paused: bool,
    pub running_session: Option<RunningSession>,
    /// Kind to resume with when paused.
    #[serde(default)]
    pub paused_kind: SessionKind,
    pub last_saved: i64,
}

/// Parse a stored record. Unparsable input counts as absent and is logged.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding corrupt stored record");
            None
        }
    }
}

pub fn encode<T: Serialize>(key: &str, value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to serialize record");
            None
        }
    }
}
