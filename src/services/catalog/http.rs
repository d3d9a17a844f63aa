/// HTTP client for the remote recommendation service
///
/// Endpoints:
/// - GET  /movies/popular  → popular list
/// - GET  /movies/{id}     → one movie or 404
/// - GET  /search?q=       → title search
/// - GET  /movies/genres   → genre list
/// - GET  /health          → service health
/// - POST /recommend       → ranked recommendations
use crate::{
    error::{AppError, AppResult},
    middleware::request_id::{make_span_with_request_id, RequestId, REQUEST_ID_HEADER},
    models::{Genre, Movie, MovieId, RecommendRequest, ServiceHealth, TopK},
    services::catalog::CatalogApi,
};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone)]
pub struct HttpCatalog {
    http_client: HttpClient,
    api_url: String,
}

impl HttpCatalog {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        let api_url = api_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            api_url,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Sends one request and decodes a JSON success body
    ///
    /// Non-success statuses become `NotFound` (404) or `Unavailable`, carrying
    /// the service's own error text when it sent one.
    async fn execute<T, F>(&self, method: Method, path: &str, build: F) -> AppResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(RequestBuilder) -> RequestBuilder + Send,
    {
        let request_id = RequestId::new();
        let span = make_span_with_request_id(&method, path, &request_id);
        let url = format!("{}{}", self.api_url, path);

        async move {
            let request = self
                .http_client
                .request(method, &url)
                .header(REQUEST_ID_HEADER, request_id.as_str());

            let response = build(request).send().await?;
            let status = response.status();

            if !status.is_success() {
                let err = error_from_response(response).await;
                tracing::warn!(status = status.as_u16(), error = %err, "Catalog request failed");
                return Err(err);
            }

            let body = response.json::<T>().await?;
            tracing::debug!(status = status.as_u16(), "Catalog request completed");
            Ok(body)
        }
        .instrument(span)
        .await
    }
}

#[async_trait::async_trait]
impl CatalogApi for HttpCatalog {
    async fn fetch_popular(&self) -> AppResult<Vec<Movie>> {
        let movies: Vec<Movie> = self
            .execute(Method::GET, "/movies/popular", |req| req)
            .await?;

        tracing::info!(results = movies.len(), "Popular movies fetched");
        Ok(movies)
    }

    async fn fetch_movie(&self, movie_id: MovieId) -> AppResult<Movie> {
        let path = format!("/movies/{}", movie_id);
        self.execute(Method::GET, &path, |req| req).await
    }

    async fn search_by_title(&self, query: &str) -> AppResult<Vec<Movie>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let movies: Vec<Movie> = self
            .execute(Method::GET, "/search", |req| req.query(&[("q", query)]))
            .await?;

        tracing::info!(query = %query, results = movies.len(), "Title search completed");
        Ok(movies)
    }

    async fn request_recommendations(
        &self,
        liked_ids: &[MovieId],
        top_k: TopK,
    ) -> AppResult<Vec<Movie>> {
        if liked_ids.is_empty() {
            return Err(AppError::EmptyLikedSet);
        }

        let body = RecommendRequest {
            liked_movie_ids: liked_ids,
            top_k,
        };

        let movies: Vec<Movie> = self
            .execute(Method::POST, "/recommend", |req| req.json(&body))
            .await?;

        tracing::info!(
            liked = liked_ids.len(),
            top_k = top_k.get(),
            results = movies.len(),
            "Recommendations fetched"
        );
        Ok(movies)
    }

    async fn fetch_genres(&self) -> AppResult<Vec<Genre>> {
        self.execute(Method::GET, "/movies/genres", |req| req).await
    }

    async fn health(&self) -> AppResult<ServiceHealth> {
        self.execute(Method::GET, "/health", |req| req).await
    }
}

async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body).unwrap_or_else(|| status_line(status));

    if status == StatusCode::NOT_FOUND {
        AppError::NotFound(detail)
    } else {
        AppError::Unavailable(detail)
    }
}

/// Pulls a `detail` or `message` field out of a JSON error body
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    ["detail", "message"]
        .iter()
        .find_map(|field| match value.get(field)? {
            serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            serde_json::Value::String(_) | serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
}

/// "<status> <reason>", e.g. "503 Service Unavailable"
fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
