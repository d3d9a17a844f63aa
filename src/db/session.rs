use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{LikedSet, Movie, MovieId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    LikedMovieIds,
    LastRecommendations,
}

impl SessionKey {
    pub const ALL: [SessionKey; 2] = [SessionKey::LikedMovieIds, SessionKey::LastRecommendations];
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKey::LikedMovieIds => write!(f, "liked_movie_ids"),
            SessionKey::LastRecommendations => write!(f, "last_recommendations"),
        }
    }
}

/// Byte-level key/value storage scoped to one session
///
/// Operations are synchronous: the orchestration core writes from its
/// synchronous intent handlers and never awaits the store.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: SessionKey) -> Option<Vec<u8>>;
    fn set(&self, key: SessionKey, value: Vec<u8>);
    fn remove(&self, key: SessionKey);
}

/// Session storage that lives as long as the process
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<SessionKey, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: SessionKey) -> Option<Vec<u8>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set(&self, key: SessionKey, value: Vec<u8>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    fn remove(&self, key: SessionKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }
}

/// Typed view over the session storage
///
/// Reads never fail: absent or malformed data degrades to empty/none
/// and never surfaces as an error.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Returns the persisted liked ids, deduplicated
    pub fn load_liked(&self) -> Vec<MovieId> {
        let Some(raw) = self.storage.get(SessionKey::LikedMovieIds) else {
            return Vec::new();
        };

        let values: Vec<serde_json::Value> = match serde_json::from_slice(&raw) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed liked ids");
                return Vec::new();
            }
        };

        let ids = values.iter().filter_map(liked_id_from_value);
        LikedSet::from_ids(ids).as_slice().to_vec()
    }

    /// Persists the deduplicated set of ids
    pub fn save_liked(&self, ids: &[MovieId]) {
        let set = LikedSet::from_ids(ids.iter().copied());
        self.write(SessionKey::LikedMovieIds, &set);
    }

    /// Returns the last cached recommendation list, in ranked order
    pub fn load_last_recommendations(&self) -> Option<Vec<Movie>> {
        let raw = self.storage.get(SessionKey::LastRecommendations)?;
        match serde_json::from_slice(&raw) {
            Ok(movies) => Some(movies),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed recommendation cache");
                None
            }
        }
    }

    pub fn save_last_recommendations(&self, movies: &[Movie]) {
        self.write(SessionKey::LastRecommendations, &movies);
    }

    /// Removes every session key; idempotent
    pub fn clear_session(&self) {
        for key in SessionKey::ALL {
            self.storage.remove(key);
        }
    }

    fn write<T: serde::Serialize>(&self, key: SessionKey, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.storage.set(key, bytes),
            Err(e) => tracing::error!(error = %e, key = %key, "Session serialization error"),
        }
    }
}

/// Integral numbers and numeric strings are ids; everything else is dropped
fn liked_id_from_value(value: &serde_json::Value) -> Option<MovieId> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
