/// Asynchronous orchestration core
///
/// Owns the session state and coordinates the five pipelines (popular,
/// search, liked, recommend, detail) between the remote catalog and the
/// session store. All mutation flows through the intent methods on
/// `SessionCore`; the presentation layer reads snapshots.
///
/// Every asynchronous operation captures a generation ticket when it is
/// issued. When the operation completes, its result is applied only if the
/// ticket is still current; otherwise it is discarded without touching
/// state. Within one pipeline the last issued input wins, regardless of the
/// order in which responses arrive.
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{LikedSet, MovieId, TopK},
    services::catalog::{fetch_movies_batch, CatalogApi},
};

pub mod debounce;
pub mod pipeline;
pub mod state;

use debounce::{spawn_debounce_worker, DebounceInput};
pub use pipeline::{Outcome, Pipeline, PipelineStatus, Ticket};
use state::CoreState;
pub use state::{Snapshot, Tab, UiError};

/// Tunables for the core
#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub search_debounce: Duration,
    pub default_top_k: TopK,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            search_debounce: Duration::from_millis(500),
            default_top_k: TopK::default(),
        }
    }
}

/// State container shared with in-flight pipeline tasks
struct Inner {
    catalog: Arc<dyn CatalogApi>,
    store: SessionStore,
    state: Mutex<CoreState>,
    changes: watch::Sender<Snapshot>,
}

/// The orchestration core
///
/// Must be started inside a Tokio runtime: pipelines run as spawned tasks.
pub struct SessionCore {
    inner: Arc<Inner>,
    search_tx: mpsc::UnboundedSender<DebounceInput<String>>,
    debounce_worker: JoinHandle<()>,
}

impl SessionCore {
    /// Restores the persisted session and starts the popular bootstrap fetch
    pub fn start(catalog: Arc<dyn CatalogApi>, store: SessionStore, settings: CoreSettings) -> Self {
        let liked = LikedSet::from_ids(store.load_liked());
        let recommendations = store.load_last_recommendations().unwrap_or_default();

        tracing::info!(
            liked = liked.len(),
            recommendations = recommendations.len(),
            "Session restored"
        );

        let state = CoreState {
            view: Snapshot {
                liked,
                recommendations,
                top_k: settings.default_top_k,
                ..Snapshot::default()
            },
            ..CoreState::default()
        };

        let (changes, _) = watch::channel(state.view.clone());
        let inner = Arc::new(Inner {
            catalog,
            store,
            state: Mutex::new(state),
            changes,
        });

        let (search_tx, search_rx) = mpsc::unbounded_channel();
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let debounce_worker = spawn_debounce_worker(settings.search_debounce, search_rx, move |query| {
            match weak.upgrade() {
                Some(inner) => {
                    inner.issue_search(query);
                    true
                }
                None => false,
            }
        });

        inner.spawn_popular();

        Self {
            inner,
            search_tx,
            debounce_worker,
        }
    }

    /// Current state
    pub fn snapshot(&self) -> Snapshot {
        self.inner.changes.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.changes.subscribe()
    }

    /// Likes or unlikes a movie; returns whether it is liked afterwards
    ///
    /// The new liked set is persisted immediately and any batch still in
    /// flight is superseded. When the liked tab is active, hydration re-runs
    /// for the new set.
    pub fn toggle_like(&self, movie_id: MovieId) -> bool {
        let (liked, rehydrate) = self.inner.update(|st| {
            let liked = st.view.liked.toggle(movie_id);
            self.inner.store.save_liked(st.view.liked.as_slice());
            let rehydrate = st.view.tab == Tab::Liked;
            if !rehydrate {
                st.cancel(Pipeline::Liked);
            }
            (liked, rehydrate)
        });

        tracing::debug!(movie_id, liked, "Toggled like");

        if rehydrate {
            self.inner.spawn_liked_hydration();
        }
        liked
    }

    /// Feeds raw query text from the user
    ///
    /// A blank query clears results synchronously and cancels any pending or
    /// in-flight search. Otherwise the text goes to the debouncer.
    pub fn set_search_query(&self, text: impl Into<String>) {
        let text = text.into();
        let blank = text.trim().is_empty();

        self.inner.update(|st| {
            st.view.search_query = text.clone();
            if blank {
                st.cancel(Pipeline::Search);
                st.view.debounced_query.clear();
                st.view.search_results.clear();
            }
        });

        let msg = if blank {
            DebounceInput::Cancel
        } else {
            DebounceInput::Value(text)
        };
        if self.search_tx.send(msg).is_err() {
            tracing::warn!("Debounce worker is not running");
        }
    }

    pub fn clear_search(&self) {
        self.set_search_query(String::new());
    }

    /// Switches the view; entering the liked tab re-hydrates liked details
    ///
    /// Leaving the liked tab supersedes its in-flight batch.
    pub fn select_tab(&self, tab: Tab) {
        self.inner.update(|st| {
            if st.view.tab == Tab::Liked && tab != Tab::Liked {
                st.cancel(Pipeline::Liked);
            }
            st.view.tab = tab;
        });
        if tab == Tab::Liked {
            self.inner.spawn_liked_hydration();
        }
    }

    /// Sets the recommendation size, clamped into 1..=50
    pub fn set_top_k(&self, k: i64) -> TopK {
        let top_k = TopK::clamped(k);
        self.inner.update(|st| st.view.top_k = top_k);
        top_k
    }

    /// Requests recommendations for the current liked set
    ///
    /// Fails immediately with `EmptyLikedSet`, without any network call,
    /// when nothing is liked. On success the list is persisted and the view
    /// switches to the recommendations tab.
    pub fn recommend(&self) -> AppResult<JoinHandle<Outcome>> {
        let (ticket, liked_ids, top_k) = self.inner.update(|st| {
            if st.view.liked.is_empty() {
                st.set_error(Pipeline::Recommend, AppError::EmptyLikedSet.to_string());
                st.view.tab = Tab::Discover;
                return Err(AppError::EmptyLikedSet);
            }
            let ticket = st.begin(Pipeline::Recommend);
            Ok((ticket, st.view.liked.as_slice().to_vec(), st.view.top_k))
        })?;

        tracing::info!(liked = liked_ids.len(), top_k = top_k.get(), "Requesting recommendations");

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            let result = inner
                .catalog
                .request_recommendations(&liked_ids, top_k)
                .await;
            inner.settle(ticket, result, |st, movies| {
                inner.store.save_last_recommendations(&movies);
                st.view.recommendations = movies;
                st.view.tab = Tab::Recommendations;
            })
        }))
    }

    /// Opens the detail view for a movie and fetches its details
    pub fn open_detail(&self, movie_id: MovieId) -> JoinHandle<Outcome> {
        let ticket = self.inner.update(|st| {
            st.view.detail_id = Some(movie_id);
            st.view.detail = None;
            st.begin(Pipeline::Detail)
        });

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = inner.catalog.fetch_movie(movie_id).await;
            inner.settle(ticket, result, |st, movie| st.view.detail = Some(movie))
        })
    }

    pub fn close_detail(&self) {
        self.inner.update(|st| {
            st.cancel(Pipeline::Detail);
            st.view.detail_id = None;
            st.view.detail = None;
        });
    }

    /// Clears the persisted session and resets state to its initial values
    ///
    /// In-flight search, liked and recommend operations are superseded, so
    /// their results are discarded when they arrive.
    pub fn reset_session(&self) {
        self.inner.update(|st| {
            self.inner.store.clear_session();

            for pipeline in [Pipeline::Search, Pipeline::Liked, Pipeline::Recommend] {
                st.cancel(pipeline);
            }

            st.view.liked = LikedSet::new();
            st.view.liked_movies.clear();
            st.view.recommendations.clear();
            st.view.search_query.clear();
            st.view.debounced_query.clear();
            st.view.search_results.clear();
            st.view.error = None;
            st.view.tab = Tab::Discover;
        });

        let _ = self.search_tx.send(DebounceInput::Cancel);
        tracing::info!("Session reset");
    }

    /// Stops the core; results of operations still in flight are discarded
    pub async fn shutdown(self) {
        self.inner.update(|st| {
            st.generations.invalidate_all();
            st.view.loading = None;
        });

        drop(self.search_tx);
        if let Err(e) = self.debounce_worker.await {
            tracing::error!(error = %e, "Debounce worker join error");
        }
        tracing::info!("Session core stopped");
    }
}

impl Inner {
    /// Mutates state under the lock and publishes the new snapshot
    fn update<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut state);
        self.changes.send_replace(state.view.clone());
        out
    }

    /// Resolves a finished operation against its ticket
    fn settle<T>(
        &self,
        ticket: Ticket,
        result: AppResult<T>,
        apply: impl FnOnce(&mut CoreState, T),
    ) -> Outcome {
        let pipeline = ticket.pipeline();

        let outcome = self.update(|st| {
            if !st.generations.is_current(&ticket) {
                return Outcome::Discarded;
            }
            if st.view.loading == Some(pipeline) {
                st.view.loading = None;
            }
            match result {
                Ok(value) => {
                    apply(st, value);
                    st.view.status.set(pipeline, PipelineStatus::Applied);
                    st.clear_error_from(pipeline);
                    Outcome::Applied
                }
                Err(e) => {
                    tracing::warn!(pipeline = %pipeline, error = %e, "Pipeline failed");
                    st.view.status.set(pipeline, PipelineStatus::Failed);
                    st.set_error(pipeline, e.to_string());
                    Outcome::Failed
                }
            }
        });

        if outcome == Outcome::Discarded {
            tracing::debug!(
                pipeline = %pipeline,
                generation = ticket.generation(),
                "Discarded stale result"
            );
        }
        outcome
    }

    fn spawn_popular(self: &Arc<Self>) -> JoinHandle<Outcome> {
        let ticket = self.update(|st| st.begin(Pipeline::Popular));

        let inner = self.clone();
        tokio::spawn(async move {
            let result = inner.catalog.fetch_popular().await;
            inner.settle(ticket, result, |st, movies| st.view.popular = movies)
        })
    }

    /// Issues a search for a debounced query
    ///
    /// Does nothing when the raw query changed after the debouncer released
    /// `query`; the newer input owns the pipeline.
    fn issue_search(self: &Arc<Self>, query: String) -> Option<JoinHandle<Outcome>> {
        let trimmed = query.trim().to_string();

        let ticket = self.update(|st| {
            if st.view.search_query != query {
                return None;
            }
            st.view.debounced_query = query;
            if trimmed.is_empty() {
                st.cancel(Pipeline::Search);
                st.view.search_results.clear();
                return None;
            }
            Some(st.begin(Pipeline::Search))
        })?;

        tracing::debug!(query = %trimmed, generation = ticket.generation(), "Issuing search");

        let inner = self.clone();
        Some(tokio::spawn(async move {
            let result = inner.catalog.search_by_title(&trimmed).await;
            inner.settle(ticket, result, |st, movies| st.view.search_results = movies)
        }))
    }

    /// Fetches details for every liked id; per-item failures are omitted
    fn spawn_liked_hydration(self: &Arc<Self>) -> Option<JoinHandle<Outcome>> {
        let (ticket, movie_ids) = self.update(|st| {
            if st.view.liked.is_empty() {
                st.cancel(Pipeline::Liked);
                st.view.liked_movies.clear();
                return None;
            }
            let ticket = st.begin(Pipeline::Liked);
            Some((ticket, st.view.liked.as_slice().to_vec()))
        })?;

        let inner = self.clone();
        Some(tokio::spawn(async move {
            let result = fetch_movies_batch(inner.catalog.clone(), movie_ids).await;
            inner.settle(ticket, result, |st, movies| st.view.liked_movies = movies)
        }))
    }
}
