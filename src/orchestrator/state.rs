use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{LikedSet, Movie, MovieId, TopK};
use crate::orchestrator::pipeline::{Generations, Pipeline, PipelineStatus, PipelineStatuses, Ticket};

/// View selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    #[default]
    Discover,
    Liked,
    Recommendations,
}

impl Display for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tab::Discover => write!(f, "discover"),
            Tab::Liked => write!(f, "liked"),
            Tab::Recommendations => write!(f, "recommendations"),
        }
    }
}

impl FromStr for Tab {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discover" => Ok(Tab::Discover),
            "liked" => Ok(Tab::Liked),
            "recommendations" | "recs" => Ok(Tab::Recommendations),
            other => Err(AppError::InvalidInput(format!("Unknown tab: {}", other))),
        }
    }
}

/// The single user-visible error slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiError {
    /// Pipeline whose operation produced the error
    pub source: Pipeline,
    pub message: String,
}

/// Read-only view of the orchestration state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub tab: Tab,
    pub popular: Vec<Movie>,
    /// Raw query text as typed
    pub search_query: String,
    /// Query text last released by the debouncer
    pub debounced_query: String,
    pub search_results: Vec<Movie>,
    pub liked: LikedSet,
    /// Hydrated details of the liked ids, in liked order
    pub liked_movies: Vec<Movie>,
    pub recommendations: Vec<Movie>,
    pub top_k: TopK,
    pub detail_id: Option<MovieId>,
    pub detail: Option<Movie>,
    /// In-flight operation marker
    pub loading: Option<Pipeline>,
    pub error: Option<UiError>,
    pub status: PipelineStatuses,
}

impl Snapshot {
    /// Movies shown on the discover tab
    pub fn discover_list(&self) -> &[Movie] {
        if self.search_query.trim().is_empty() {
            &self.popular
        } else {
            &self.search_results
        }
    }

    pub fn is_liked(&self, movie_id: MovieId) -> bool {
        self.liked.contains(movie_id)
    }

    pub fn status(&self, pipeline: Pipeline) -> PipelineStatus {
        self.status.get(pipeline)
    }
}

/// Mutable state owned by the core: the published view plus generations
#[derive(Debug, Default)]
pub(crate) struct CoreState {
    pub view: Snapshot,
    pub generations: Generations,
}

impl CoreState {
    /// Issues a new ticket and marks the pipeline in flight
    pub fn begin(&mut self, pipeline: Pipeline) -> Ticket {
        let ticket = self.generations.issue(pipeline);
        self.view.loading = Some(pipeline);
        self.view.status.set(pipeline, PipelineStatus::Pending);
        ticket
    }

    /// Supersedes any in-flight operation and returns the pipeline to idle
    pub fn cancel(&mut self, pipeline: Pipeline) {
        self.generations.invalidate(pipeline);
        self.view.status.set(pipeline, PipelineStatus::Idle);
        if self.view.loading == Some(pipeline) {
            self.view.loading = None;
        }
    }

    pub fn set_error(&mut self, source: Pipeline, message: impl Into<String>) {
        self.view.error = Some(UiError {
            source,
            message: message.into(),
        });
    }

    /// Clears the error slot when it belongs to `source`
    pub fn clear_error_from(&mut self, source: Pipeline) {
        if self.view.error.as_ref().map(|e| e.source) == Some(source) {
            self.view.error = None;
        }
    }
}
