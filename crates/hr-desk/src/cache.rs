//! Read-through cache for lookup queries. Purely an optimisation: every
//! backend failure degrades to computing the value.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store with per-entry expiry holding serialized payloads.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
    payload: String,
    expires_at: Instant,
}

/// Process-local backend. Expired entries are dropped when read and swept on
/// every write.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.payload.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Unavailable(format!("ttl {ttl:?} out of range")))?;
        let mut entries = self.entries()?;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(key.to_string(), Entry { payload, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Deterministic key from an operation name and its arguments,
/// e.g. `candidates_by_vacancy:17`.
pub fn cache_key(operation: &str, args: &[&dyn Display]) -> String {
    let mut key = operation.to_string();
    for arg in args {
        key.push(':');
        key.push_str(&arg.to_string());
    }
    key
}

#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Option<Arc<dyn CacheBackend>>,
    default_ttl: Duration,
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("enabled", &self.backend.is_some())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            default_ttl,
        }
    }

    /// Always computes.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    /// Backend and payload errors count as misses; compute errors propagate
    /// and are never cached. A `null` result is not stored.
    pub fn get_or_compute<T, E, F>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        let Some(backend) = &self.backend else {
            return compute();
        };

        match backend.get(key) {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(err) => warn!(key, error = %err, "discarding malformed cache payload"),
            },
            Ok(None) => debug!(key, "cache miss"),
            Err(err) => warn!(key, error = %err, "cache lookup failed, computing"),
        }

        let value = compute()?;
        match serde_json::to_string(&value) {
            Ok(payload) if payload == "null" => {}
            Ok(payload) => {
                let ttl = ttl.unwrap_or(self.default_ttl);
                if let Err(err) = backend.set(key, payload, ttl) {
                    warn!(key, error = %err, "cache store failed");
                }
            }
            Err(err) => warn!(key, error = %err, "value not cacheable"),
        }
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) {
        if let Some(backend) = &self.backend {
            if let Err(err) = backend.delete(key) {
                warn!(key, error = %err, "cache invalidation failed");
            }
        }
    }
}
