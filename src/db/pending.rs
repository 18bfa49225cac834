//! Session-scoped pending state with per-record TTL.
//!
//! Records are keyed by (browser session id, namespace). Writes overwrite,
//! last write wins. Expired records read as absent.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::models::PendingState;

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

type Key = (String, &'static str);

/// Shared store of pending records for all sessions.
#[derive(Clone, Default)]
pub struct PendingStateStore {
    entries: Arc<DashMap<Key, Entry>>,
}

impl PendingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle scoped to one browser session.
    pub fn session(&self, session_id: impl Into<String>) -> PendingSession {
        PendingSession {
            store: self.clone(),
            session_id: session_id.into(),
        }
    }

    /// Drop every expired record. Returns the count.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pending state for a single browser session.
#[derive(Clone)]
pub struct PendingSession {
    store: PendingStateStore,
    session_id: String,
}

impl PendingSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    fn key<T: PendingState>(&self) -> Key {
        (self.session_id.clone(), T::NAMESPACE)
    }

    /// Live record, if any. A record that fails to decode reads as absent.
    pub fn get<T: PendingState>(&self) -> Option<T> {
        let key = self.key::<T>();
        let value = {
            let entry = self.store.entries.get(&key)?;
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        };
        match value {
            Some(value) => serde_json::from_value(value).ok(),
            None => {
                self.store
                    .entries
                    .remove_if(&key, |_, e| e.expires_at <= Instant::now());
                None
            }
        }
    }

    /// Store a record with its type's TTL, replacing any previous one.
    pub fn set<T: PendingState>(&self, record: &T) -> Result<(), AppError> {
        self.set_with_ttl(record, T::TTL)
    }

    pub fn set_with_ttl<T: PendingState>(&self, record: &T, ttl: Duration) -> Result<(), AppError> {
        let value = serde_json::to_value(record)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Pending state encode: {}", e)))?;
        self.store.entries.insert(
            self.key::<T>(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// Modify a live record in place, keeping its original deadline.
    ///
    /// Fails with `SessionExpired` if there is no live record.
    pub fn update<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: PendingState,
        F: FnOnce(&mut T),
    {
        let key = self.key::<T>();
        let mut entry = self
            .store
            .entries
            .get_mut(&key)
            .filter(|e| e.expires_at > Instant::now())
            .ok_or(AppError::SessionExpired)?;

        let mut record: T =
            serde_json::from_value(entry.value.clone()).map_err(|_| AppError::SessionExpired)?;
        f(&mut record);
        entry.value = serde_json::to_value(&record)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Pending state encode: {}", e)))?;
        Ok(record)
    }

    /// Remove and return the record. Expired records are removed too.
    pub fn take<T: PendingState>(&self) -> Option<T> {
        let (_, entry) = self.store.entries.remove(&self.key::<T>())?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        serde_json::from_value(entry.value).ok()
    }

    pub fn remove<T: PendingState>(&self) {
        self.store.entries.remove(&self.key::<T>());
    }
}
