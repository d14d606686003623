//! A string key-value store that announces every write.
//!
//! Stands in for browser local storage shared by all tabs of one origin.
//! Values are JSON text. Subscribers receive a [`StoreChange`] for each
//! `set`, `update` or `remove`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::error::MirrorError;

/// Default buffer capacity for the change channel.
const DEFAULT_CAPACITY: usize = 256;

/// One write to the store. `value` is `None` for a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub value: Option<String>,
}

pub struct LocalStore {
    entries: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl LocalStore {
    /// Create a store whose change channel buffers `capacity` writes.
    ///
    /// Slow subscribers observe `RecvError::Lagged` and should re-read.
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: String) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        self.publish(key, Some(value));
    }

    pub async fn remove(&self, key: &str) {
        let removed = self.entries.write().await.remove(key);
        if removed.is_some() {
            self.publish(key, None);
        }
    }

    /// Read `key` as JSON. Missing and unparsable values are both `None`;
    /// the latter is logged.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        parse(key, &raw)
    }

    /// Read-modify-write `key` as JSON under the store's write lock.
    ///
    /// `f` receives the current value (or `None`) and returns the new one.
    /// Unlike separate `get_json`/`set` calls, no other write can land in
    /// between.
    pub async fn update_json<T, F, R>(&self, key: &str, f: F) -> Result<R, MirrorError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> (T, R),
    {
        let mut entries = self.entries.write().await;
        let current = entries.get(key).and_then(|raw| parse::<T>(key, raw));
        let (next, result) = f(current);
        let raw = serde_json::to_string(&next).map_err(|source| MirrorError::Encode {
            key: key.to_string(),
            source,
        })?;
        entries.insert(key.to_string(), raw.clone());
        drop(entries);

        self.publish(key, Some(raw));
        Ok(result)
    }

    fn publish(&self, key: &str, value: Option<String>) {
        // A send error only means nobody is listening.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn parse<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable local store value");
            None
        }
    }
}
