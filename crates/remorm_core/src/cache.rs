//! Read-through record cache.
//!
//! Persisters cache find-by-id wire records as JSON strings. The cache
//! sits behind the identity map: a hit rebuilds a managed entity without
//! a remote call, a miss falls through to the remote API and populates
//! the cache on the way back.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Storage backend for cached wire records.
pub trait CacheBackend: Send + Sync {
    /// Returns the payload under `key`, if present and fresh.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `payload` under `key` for `ttl`.
    fn set(&self, key: &str, payload: String, ttl: Duration);

    /// Drops the entry under `key`.
    fn delete(&self, key: &str);
}

struct Entry {
    payload: String,
    expires_at: Instant,
}

/// Process-local cache backend.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, expired ones included until they are
    /// touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheBackend for InMemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, payload: String, ttl: Duration) {
        self.entries.lock().insert(
            key.to_owned(),
            Entry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// How cache keys are derived from class name and flattened identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Human-readable key, sanitized for backends that reject spaces.
    #[default]
    Scalar,
    /// SHA-256 digest of class and identifier; fixed length, opaque.
    Hashed,
}

impl KeyStrategy {
    /// Derives the cache key for one record.
    #[must_use]
    pub fn key(&self, class: &str, id_hash: &str) -> String {
        match self {
            KeyStrategy::Scalar => {
                format!("{}:{}", sanitize(class), sanitize(id_hash))
            }
            KeyStrategy::Hashed => {
                let mut hasher = Sha256::new();
                hasher.update(class.as_bytes());
                hasher.update([0u8]);
                hasher.update(id_hash.as_bytes());
                hex_digest(&hasher.finalize())
            }
        }
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '.'
            }
        })
        .collect()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
