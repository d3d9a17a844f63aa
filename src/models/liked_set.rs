use serde::{Deserialize, Serialize};

use super::MovieId;

/// The visitor's liked movies
///
/// Ordered by the time each id was liked. Set semantics are enforced on
/// every write: building a set from a sequence keeps the first occurrence
/// of each id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikedSet(Vec<MovieId>);

impl LikedSet {
    /// Creates an empty liked set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a set from any sequence of ids, collapsing duplicates
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = MovieId>,
    {
        let mut set = Self::new();
        for id in ids {
            if !set.contains(id) {
                set.0.push(id);
            }
        }
        set
    }

    /// Adds the id if absent, removes it if present
    ///
    /// Returns whether the id is liked afterwards.
    pub fn toggle(&mut self, movie_id: MovieId) -> bool {
        if let Some(pos) = self.0.iter().position(|id| *id == movie_id) {
            self.0.remove(pos);
            false
        } else {
            self.0.push(movie_id);
            true
        }
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.0.contains(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[MovieId] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = MovieId> + '_ {
        self.0.iter().copied()
    }
}
