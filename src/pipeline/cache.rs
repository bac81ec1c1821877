//! Last accepted value per `(table, device, tag)`.
//!
//! The cache is the only state shared between the session manager (which clears
//! it when the platform pushes a new configuration) and the processing pipeline
//! (which reads and writes it from concurrent `write_sample` calls).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

/// Cache key validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// One of the three key components was empty or whitespace.
    #[error("cache key component '{0}' must not be blank")]
    BlankKey(&'static str),
}

/// Last accepted value of one tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    pub value: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    table: String,
    device: String,
    tag: String,
}

impl CacheKey {
    fn new(table: &str, device: &str, tag: &str) -> Result<Self, CacheError> {
        for (name, part) in [("table", table), ("device", device), ("tag", tag)] {
            if part.trim().is_empty() {
                return Err(CacheError::BlankKey(name));
            }
        }
        Ok(Self {
            table: table.to_string(),
            device: device.to_string(),
            tag: tag.to_string(),
        })
    }
}

/// Concurrency-safe map of last accepted values.
///
/// Reads take a shared lock, so concurrent samples only serialize on writes.
/// [`clear`](Self::clear) holds the write lock for the whole operation; no reader
/// can observe a partially cleared cache.
#[derive(Debug, Default)]
pub struct LastValidValueCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl LastValidValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` as the last accepted value, stamped with the current time.
    pub fn put(&self, table: &str, device: &str, tag: &str, value: f64) -> Result<(), CacheError> {
        let key = CacheKey::new(table, device, tag)?;
        let entry = CacheEntry {
            value,
            updated_at: Utc::now(),
        };
        self.entries.write().insert(key, entry);
        Ok(())
    }

    /// Look up the last accepted value.
    pub fn get(&self, table: &str, device: &str, tag: &str) -> Result<Option<CacheEntry>, CacheError> {
        let key = CacheKey::new(table, device, tag)?;
        Ok(self.entries.read().get(&key).copied())
    }

    /// Read the last accepted value and decide the next one under one write lock.
    ///
    /// `decide` gets the current value and returns the value to store (`None`
    /// keeps the entry as it is) together with a result handed back to the caller.
    /// Concurrent updates of the same key are serialized, so none is lost.
    pub fn update<T>(
        &self,
        table: &str,
        device: &str,
        tag: &str,
        decide: impl FnOnce(Option<f64>) -> (Option<f64>, T),
    ) -> Result<T, CacheError> {
        let key = CacheKey::new(table, device, tag)?;
        let mut entries = self.entries.write();
        let (next, result) = decide(entries.get(&key).map(|entry| entry.value));
        if let Some(value) = next {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    updated_at: Utc::now(),
                },
            );
        }
        Ok(result)
    }

    /// Drop every entry. Called when the platform reloads the device configuration.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped, "Last-valid-value cache cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
