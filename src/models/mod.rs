use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;

pub mod liked_set;
pub mod top_k;

pub use liked_set::LikedSet;
pub use top_k::TopK;

/// Stable identifier of a movie in the remote catalog
pub type MovieId = i64;

/// A movie as returned by the remote service
///
/// Movies are immutable value objects once received. The wire format mixes
/// a camelCase `movieId` with snake_case attributes; the same shape is used
/// when a recommendation list is persisted, so round trips are verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    #[serde(rename = "movieId")]
    pub movie_id: MovieId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_year",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
}

impl Movie {
    /// Creates a movie with only an id and a title
    pub fn new(movie_id: MovieId, title: impl Into<String>) -> Self {
        Self {
            movie_id,
            title: title.into(),
            poster_url: None,
            year: None,
            genres: None,
            rating_mean: None,
            rating_count: None,
            overview: None,
        }
    }

    /// Title for display, falling back to the id when the service sent none
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("Movie #{}", self.movie_id)
        } else {
            self.title.clone()
        }
    }

    /// Poster URL, with empty or blank values treated as absent
    pub fn poster(&self) -> Option<&str> {
        self.poster_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Mean rating, only when it is a finite number
    pub fn rating(&self) -> Option<f64> {
        self.rating_mean.filter(|r| r.is_finite())
    }

    pub fn genres(&self) -> Option<&str> {
        self.genres.as_deref().filter(|g| !g.trim().is_empty())
    }
}

impl Display for Movie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.movie_id, self.display_title())?;
        if let Some(year) = self.year {
            write!(f, " ({})", year)?;
        }
        Ok(())
    }
}

/// Accepts integers, integral floats and numeric strings; anything else is absent
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let year = match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(year.and_then(|y| i32::try_from(y).ok()))
}

// ============================================================================
// Catalog metadata
// ============================================================================

/// A genre entry; the service may send bare strings or objects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Genre {
    Name(String),
    Entry {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl Genre {
    pub fn name(&self) -> Option<&str> {
        match self {
            Genre::Name(name) => Some(name.as_str()),
            Genre::Entry { name, .. } => name.as_deref(),
        }
    }
}

/// Response from GET /health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceHealth {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub model_status: Option<String>,
}

/// Body of POST /recommend
#[derive(Debug, Serialize)]
pub struct RecommendRequest<'a> {
    pub liked_movie_ids: &'a [MovieId],
    pub top_k: TopK,
}
