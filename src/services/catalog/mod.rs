/// Remote catalog abstraction
///
/// This module wraps the remote recommendation service. Each operation
/// issues exactly one network call and is stateless; staleness of results
/// is decided by the caller, not by the client.
use crate::{
    error::{AppError, AppResult},
    models::{Genre, Movie, MovieId, ServiceHealth, TopK},
};
use std::sync::Arc;

pub mod http;

pub use http::HttpCatalog;

/// Trait for the remote movie catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Fetch the popular movies list
    async fn fetch_popular(&self) -> AppResult<Vec<Movie>>;

    /// Fetch one movie by id
    ///
    /// Fails with `NotFound` when the service does not know the id and with
    /// `Unavailable` for any other service error.
    async fn fetch_movie(&self, movie_id: MovieId) -> AppResult<Movie>;

    /// Search movies by title; the query must not be blank
    async fn search_by_title(&self, query: &str) -> AppResult<Vec<Movie>>;

    /// Request a ranked recommendation list for the liked ids
    async fn request_recommendations(
        &self,
        liked_ids: &[MovieId],
        top_k: TopK,
    ) -> AppResult<Vec<Movie>>;

    /// Fetch the genre list
    async fn fetch_genres(&self) -> AppResult<Vec<Genre>>;

    /// Probe the service health endpoint
    async fn health(&self) -> AppResult<ServiceHealth>;
}

/// Fetch details for multiple movies in parallel
///
/// Issues one `fetch_movie` per id. Items that fail are omitted from the
/// result, which keeps the order of `movie_ids`. The batch only fails when
/// every item failed.
pub async fn fetch_movies_batch(
    catalog: Arc<dyn CatalogApi>,
    movie_ids: Vec<MovieId>,
) -> AppResult<Vec<Movie>> {
    if movie_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut tasks = Vec::new();

    for movie_id in movie_ids {
        let catalog = catalog.clone();
        let task = tokio::spawn(async move { catalog.fetch_movie(movie_id).await });
        tasks.push((movie_id, task));
    }

    let mut results = Vec::new();
    let mut errors = Vec::new();

    for (movie_id, task) in tasks {
        match task.await {
            Ok(Ok(movie)) => results.push(movie),
            Ok(Err(e)) => {
                tracing::debug!(movie_id, error = %e, "Movie fetch failed, omitting from batch");
                errors.push(e);
            }
            Err(e) => {
                tracing::error!(movie_id, error = %e, "Task join error");
                errors.push(AppError::Internal(e.to_string()));
            }
        }
    }

    if !errors.is_empty() {
        tracing::warn!(
            success_count = results.len(),
            error_count = errors.len(),
            "Partial movie batch failure"
        );
    }

    if results.is_empty() && !errors.is_empty() {
        return Err(AppError::BatchFailed(
            "Failed to load liked movies".to_string(),
        ));
    }

    Ok(results)
}
