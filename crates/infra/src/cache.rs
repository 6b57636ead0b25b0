//! Tag-aware memoization cache.
//!
//! Entries carry a TTL and a set of tags; invalidating a tag evicts every
//! entry carrying it. Values are stored as JSON so one cache can hold any
//! serializable result.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::CacheError;

pub trait TaggedCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError>;

    fn put(&self, key: &str, value: JsonValue, ttl: Duration, tags: &[String]) -> Result<(), CacheError>;

    /// Evict every entry carrying `tag`.
    fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError>;

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Cache failures never fail the call: an unreadable or undecodable entry
    /// counts as a miss, a failed write is logged.
    fn remember<T, E, F>(&self, key: &str, ttl: Duration, tags: &[String], producer: F) -> Result<T, E>
    where
        Self: Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        match self.get(key) {
            Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::warn!(key, error = %e, "cached value undecodable; recomputing"),
            },
            Ok(None) => tracing::debug!(key, "cache miss"),
            Err(e) => tracing::warn!(key, error = %e, "cache read failed; recomputing"),
        }

        let value = producer()?;

        if !ttl.is_zero() {
            let stored = serde_json::to_value(&value)
                .map_err(CacheError::from)
                .and_then(|raw| self.put(key, raw, ttl, tags));
            if let Err(e) = stored {
                tracing::warn!(key, error = %e, "cache write failed");
            }
        }

        Ok(value)
    }
}

impl<C> TaggedCache for Arc<C>
where
    C: TaggedCache + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: JsonValue, ttl: Duration, tags: &[String]) -> Result<(), CacheError> {
        (**self).put(key, value, ttl, tags)
    }

    fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        (**self).invalidate_tag(tag)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: JsonValue,
    /// `None` when the TTL does not fit in an `Instant`: the entry never expires.
    expires_at: Option<Instant>,
    tags: Vec<String>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    by_tag: HashMap<String, HashSet<String>>,
}

impl CacheState {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            for tag in entry.tags {
                if let Some(keys) = self.by_tag.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.by_tag.remove(&tag);
                    }
                }
            }
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }
    }
}

/// In-process cache.
///
/// Intended for tests/dev and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryTaggedCache {
    state: RwLock<CacheState>,
}

impl InMemoryTaggedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .map(|s| s.entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaggedCache for InMemoryTaggedCache {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError> {
        let now = Instant::now();
        {
            let state = self
                .state
                .read()
                .map_err(|_| CacheError::Poisoned("tagged cache"))?;
            match state.entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // expired: drop it
        let mut state = self
            .state
            .write()
            .map_err(|_| CacheError::Poisoned("tagged cache"))?;
        state.remove(key);
        Ok(None)
    }

    fn put(&self, key: &str, value: JsonValue, ttl: Duration, tags: &[String]) -> Result<(), CacheError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CacheError::Poisoned("tagged cache"))?;

        let now = Instant::now();
        state.purge_expired(now);
        state.remove(key);
        for tag in tags {
            state.by_tag.entry(tag.clone()).or_default().insert(key.to_string());
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now.checked_add(ttl),
                tags: tags.to_vec(),
            },
        );
        Ok(())
    }

    fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CacheError::Poisoned("tagged cache"))?;

        let keys: Vec<String> = state
            .by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            state.remove(&key);
        }
        Ok(())
    }
}

/// Redis-backed cache.
///
/// Each entry is a `SET key value EX ttl`; each tag is a Redis set of the keys
/// carrying it, stored under `{namespace}:tag:{tag}`. A tag set expires with
/// the longest-lived entry added to it (`EXPIRE … NX` / `GT`, Redis 7+).
#[cfg(feature = "redis")]
#[derive(Debug, Clone)]
pub struct RedisTaggedCache {
    client: Arc<redis::Client>,
    namespace: String,
}

#[cfg(feature = "redis")]
impl RedisTaggedCache {
    pub fn new(redis_url: impl AsRef<str>, namespace: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            namespace: namespace.into(),
        })
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.namespace, tag)
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        self.client
            .get_connection()
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

#[cfg(feature = "redis")]
impl TaggedCache for RedisTaggedCache {
    #[tracing::instrument(skip(self), err)]
    fn get(&self, key: &str) -> Result<Option<JsonValue>, CacheError> {
        let mut conn = self.connection()?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.entry_key(key))
            .query(&mut conn)
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(CacheError::from))
            .transpose()
    }

    #[tracing::instrument(skip(self, value), err)]
    fn put(&self, key: &str, value: JsonValue, ttl: Duration, tags: &[String]) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let payload = serde_json::to_string(&value)?;
        let entry_key = self.entry_key(key);

        let seconds = ttl.as_secs().max(1);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(&entry_key)
            .arg(payload)
            .arg("EX")
            .arg(seconds)
            .ignore();
        for tag in tags {
            let tag_key = self.tag_key(tag);
            pipe.cmd("SADD").arg(&tag_key).arg(&entry_key).ignore();
            pipe.cmd("EXPIRE").arg(&tag_key).arg(seconds).arg("NX").ignore();
            pipe.cmd("EXPIRE").arg(&tag_key).arg(seconds).arg("GT").ignore();
        }
        pipe.query::<()>(&mut conn)
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    #[tracing::instrument(skip(self), err)]
    fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let tag_key = self.tag_key(tag);
        let keys: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&tag_key)
            .query(&mut conn)
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in &keys {
            pipe.cmd("DEL").arg(key).ignore();
        }
        pipe.cmd("DEL").arg(&tag_key).ignore();
        pipe.query::<()>(&mut conn)
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}
