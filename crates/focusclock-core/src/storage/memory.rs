//! In-process shared store.
//!
//! One [`MemoryStore`] plays the role of the origin's storage; each call to
//! [`MemoryStore::context`] hands out a handle for one execution context.
//! Writes are fanned out over a `tokio::sync::broadcast` channel and every
//! handle filters out the envelopes it sent itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use super::{SharedStore, StorageEvent};
use crate::error::StoreError;

/// Allows bursts of writes between two drains without lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Envelope {
    origin: String,
    event: StorageEvent,
}

/// The shared key space. Cheap to clone; clones share data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
    tx: broadcast::Sender<Envelope>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            tx,
        }
    }

    /// Attach a new execution context.
    pub fn context(&self) -> MemoryStoreHandle {
        MemoryStoreHandle {
            id: uuid::Uuid::new_v4().to_string(),
            data: Arc::clone(&self.data),
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
        }
    }

    /// Raw read, bypassing any context.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.data.lock().ok()?.get(key).cloned()
    }
}

/// One context's view of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryStoreHandle {
    id: String,
    data: Arc<Mutex<HashMap<String, String>>>,
    tx: broadcast::Sender<Envelope>,
    rx: Mutex<broadcast::Receiver<Envelope>>,
}

impl MemoryStoreHandle {
    fn write(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let old_value = {
            let mut data = self.data.lock().map_err(|_| StoreError::Locked)?;
            match value {
                Some(v) => data.insert(key.to_string(), v.to_string()),
                None => data.remove(key),
            }
        };
        let new_value = value.map(str::to_string);
        if old_value == new_value {
            return Ok(());
        }
        // No receivers is fine: nobody else is listening yet.
        let _ = self.tx.send(Envelope {
            origin: self.id.clone(),
            event: StorageEvent {
                key: key.to_string(),
                old_value,
                new_value,
            },
        });
        Ok(())
    }
}

impl SharedStore for MemoryStoreHandle {
    fn context_id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Locked)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.write(key, None)
    }

    fn drain_changes(&self) -> Result<Vec<StorageEvent>, StoreError> {
        let mut rx = self.rx.lock().map_err(|_| StoreError::Locked)?;
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(envelope) => {
                    if envelope.origin != self.id {
                        events.push(envelope.event);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(context = %self.id, skipped, "change feed lagged");
                }
                Err(TryRecvError::Closed) => return Err(StoreError::ChannelClosed),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_does_not_observe_own_change() {
        let store = MemoryStore::new();
        let a = store.context();
        let b = store.context();

        a.set("k", "1").unwrap();

        assert!(a.drain_changes().unwrap().is_empty());
        let seen = b.drain_changes().unwrap();
        assert_eq!(
            seen,
            vec![StorageEvent {
                key: "k".into(),
                old_value: None,
                new_value: Some("1".into()),
            }]
        );
    }

    #[test]
    fn remove_reports_previous_value() {
        let store = MemoryStore::new();
        let a = store.context();
        let b = store.context();
        a.set("k", "1").unwrap();
        a.remove("k").unwrap();

        let seen = b.drain_changes().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].old_value.as_deref(), Some("1"));
        assert_eq!(seen[1].new_value, None);
        assert_eq!(b.get("k").unwrap(), None);
    }

    #[test]
    fn unchanged_write_is_not_broadcast() {
        let store = MemoryStore::new();
        let a = store.context();
        let b = store.context();
        a.set("k", "1").unwrap();
        b.drain_changes().unwrap();

        a.set("k", "1").unwrap();
        assert!(b.drain_changes().unwrap().is_empty());
    }

    #[test]
    fn late_context_sees_data_but_not_old_changes() {
        let store = MemoryStore::new();
        let a = store.context();
        a.set("k", "1").unwrap();

        let c = store.context();
        assert_eq!(c.get("k").unwrap().as_deref(), Some("1"));
        assert!(c.drain_changes().unwrap().is_empty());
    }
}
