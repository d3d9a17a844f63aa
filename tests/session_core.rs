use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use movie_session::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{Genre, Movie, MovieId, ServiceHealth, TopK},
    orchestrator::{Outcome, Pipeline, PipelineStatus},
    services::CatalogApi,
    CoreSettings, SessionCore, Snapshot, Tab,
};

const WAIT: Duration = Duration::from_secs(30);
const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
enum Request {
    Popular,
    Movie(MovieId),
    Search(String),
    Recommend(Vec<MovieId>, u8),
}

type Reply = AppResult<Vec<Movie>>;

/// A request held until the test releases it
struct Pending {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

impl Pending {
    fn ok(self, movies: Vec<Movie>) {
        let _ = self.reply.send(Ok(movies));
    }

    fn fail(self, message: &str) {
        let _ = self.reply.send(Err(AppError::Unavailable(message.to_string())));
    }
}

/// Catalog whose responses are released by the test
///
/// The popular list is answered immediately; every other call waits in a
/// queue until the test replies to it.
struct GatedCatalog {
    popular: Result<Vec<Movie>, String>,
    queue: Mutex<VecDeque<Pending>>,
    log: Mutex<Vec<Request>>,
    arrived: Notify,
}

impl GatedCatalog {
    fn new() -> Arc<Self> {
        Self::with_popular(Ok(vec![movie(1, "Popular One"), movie(2, "Popular Two")]))
    }

    fn with_popular(popular: Result<Vec<Movie>, String>) -> Arc<Self> {
        Arc::new(Self {
            popular,
            queue: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            arrived: Notify::new(),
        })
    }

    async fn call(&self, request: Request) -> Reply {
        self.log.lock().unwrap().push(request.clone());

        if request == Request::Popular {
            return self.popular.clone().map_err(AppError::Unavailable);
        }

        let (reply, rx) = oneshot::channel();
        self.queue.lock().unwrap().push_back(Pending { request, reply });
        self.arrived.notify_one();

        rx.await
            .unwrap_or_else(|_| Err(AppError::Internal("reply dropped".to_string())))
    }

    /// Waits for the next held request
    async fn next(&self) -> Pending {
        timeout(WAIT, async {
            loop {
                if let Some(pending) = self.queue.lock().unwrap().pop_front() {
                    return pending;
                }
                self.arrived.notified().await;
            }
        })
        .await
        .expect("no request arrived")
    }

    async fn next_n(&self, n: usize) -> Vec<Pending> {
        let mut all = Vec::new();
        for _ in 0..n {
            all.push(self.next().await);
        }
        all
    }

    fn held(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn searches(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Request::Search(q) => Some(q.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CatalogApi for GatedCatalog {
    async fn fetch_popular(&self) -> AppResult<Vec<Movie>> {
        self.call(Request::Popular).await
    }

    async fn fetch_movie(&self, movie_id: MovieId) -> AppResult<Movie> {
        self.call(Request::Movie(movie_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("movieId not found".to_string()))
    }

    async fn search_by_title(&self, query: &str) -> AppResult<Vec<Movie>> {
        self.call(Request::Search(query.to_string())).await
    }

    async fn request_recommendations(
        &self,
        liked_ids: &[MovieId],
        top_k: TopK,
    ) -> AppResult<Vec<Movie>> {
        self.call(Request::Recommend(liked_ids.to_vec(), top_k.get()))
            .await
    }

    async fn fetch_genres(&self) -> AppResult<Vec<Genre>> {
        Ok(Vec::new())
    }

    async fn health(&self) -> AppResult<ServiceHealth> {
        Ok(ServiceHealth {
            ok: true,
            model_status: None,
        })
    }
}

fn movie(id: MovieId, title: &str) -> Movie {
    Movie::new(id, title)
}

fn ids(movies: &[Movie]) -> Vec<MovieId> {
    movies.iter().map(|m| m.movie_id).collect()
}

fn start(catalog: &Arc<GatedCatalog>, store: &SessionStore) -> SessionCore {
    let settings = CoreSettings {
        search_debounce: DEBOUNCE,
        ..CoreSettings::default()
    };
    SessionCore::start(catalog.clone(), store.clone(), settings)
}

async fn wait_until(core: &SessionCore, cond: impl FnMut(&Snapshot) -> bool) -> Snapshot {
    let mut rx = core.subscribe();
    let snapshot = timeout(WAIT, rx.wait_for(cond))
        .await
        .expect("condition never held")
        .expect("core dropped");
    snapshot.clone()
}

/// Lets spawned tasks run to their next suspension point
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Popular bootstrap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_popular_loaded_at_start() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    let snapshot = wait_until(&core, |s| s.status(Pipeline::Popular) == PipelineStatus::Applied).await;

    assert_eq!(ids(&snapshot.popular), vec![1, 2]);
    assert_eq!(ids(snapshot.discover_list()), vec![1, 2]);
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_popular_failure_surfaces_error() {
    let catalog = GatedCatalog::with_popular(Err("503 Service Unavailable".to_string()));
    let core = start(&catalog, &SessionStore::in_memory());

    let snapshot = wait_until(&core, |s| s.error.is_some()).await;

    let error = snapshot.error.as_ref().unwrap();
    assert_eq!(error.source, Pipeline::Popular);
    assert_eq!(error.message, "503 Service Unavailable");
    assert!(snapshot.popular.is_empty());
    assert_eq!(snapshot.status(Pipeline::Popular), PipelineStatus::Failed);
}

// ============================================================================
// Debounced search
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rapid_typing_issues_one_search() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    for text in ["b", "ba", "bat"] {
        core.set_search_query(text);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let pending = catalog.next().await;
    assert_eq!(pending.request, Request::Search("bat".to_string()));
    pending.ok(vec![movie(30, "Batman")]);

    let snapshot = wait_until(&core, |s| !s.search_results.is_empty()).await;
    assert_eq!(ids(&snapshot.search_results), vec![30]);
    assert_eq!(ids(snapshot.discover_list()), vec![30]);
    assert_eq!(snapshot.debounced_query, "bat");

    tokio::time::sleep(DEBOUNCE * 4).await;
    assert_eq!(catalog.searches(), vec!["bat".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_older_search_response_is_discarded() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    core.set_search_query("a");
    let first = catalog.next().await;

    core.set_search_query("b");
    let second = catalog.next().await;
    assert_eq!(second.request, Request::Search("b".to_string()));

    second.ok(vec![movie(2, "B movie")]);
    wait_until(&core, |s| !s.search_results.is_empty()).await;

    first.ok(vec![movie(1, "A movie")]);
    settle().await;

    let snapshot = core.snapshot();
    assert_eq!(ids(&snapshot.search_results), vec![2]);
    assert_eq!(snapshot.status(Pipeline::Search), PipelineStatus::Applied);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_search_is_discarded_even_when_first_to_arrive() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    core.set_search_query("a");
    let first = catalog.next().await;
    core.set_search_query("b");
    let second = catalog.next().await;

    first.ok(vec![movie(1, "A movie")]);
    settle().await;
    assert!(core.snapshot().search_results.is_empty());
    assert_eq!(core.snapshot().status(Pipeline::Search), PipelineStatus::Pending);

    second.ok(vec![movie(2, "B movie")]);
    let snapshot = wait_until(&core, |s| !s.search_results.is_empty()).await;
    assert_eq!(ids(&snapshot.search_results), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_clearing_query_within_window_sends_nothing() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    core.set_search_query("x");
    tokio::time::sleep(Duration::from_millis(100)).await;
    core.set_search_query("");

    tokio::time::sleep(DEBOUNCE * 4).await;

    assert!(catalog.searches().is_empty());
    assert_eq!(catalog.held(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clearing_query_discards_in_flight_search() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());
    wait_until(&core, |s| !s.popular.is_empty()).await;

    core.set_search_query("x");
    let pending = catalog.next().await;

    core.clear_search();
    let snapshot = core.snapshot();
    assert!(snapshot.search_results.is_empty());
    assert_eq!(snapshot.search_query, "");
    assert_eq!(snapshot.status(Pipeline::Search), PipelineStatus::Idle);
    assert_eq!(ids(snapshot.discover_list()), vec![1, 2]);

    pending.ok(vec![movie(9, "Too late")]);
    settle().await;

    assert!(core.snapshot().search_results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_search_keeps_popular() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());
    wait_until(&core, |s| !s.popular.is_empty()).await;

    core.set_search_query("zz");
    catalog.next().await.fail("boom");

    let snapshot = wait_until(&core, |s| s.error.is_some()).await;
    assert_eq!(snapshot.error.as_ref().unwrap().source, Pipeline::Search);
    assert_eq!(snapshot.status(Pipeline::Search), PipelineStatus::Failed);
    assert_eq!(ids(&snapshot.popular), vec![1, 2]);
    assert_eq!(snapshot.loading, None);

    // the next successful search clears the error
    core.set_search_query("zzz");
    catalog.next().await.ok(vec![movie(5, "Zoolander")]);
    let snapshot = wait_until(&core, |s| !s.search_results.is_empty()).await;
    assert!(snapshot.error.is_none());
}

// ============================================================================
// Liked hydration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_partial_hydration_omits_failed_items() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_liked(&[1, 2, 3]);
    let core = start(&catalog, &store);

    core.select_tab(Tab::Liked);

    for pending in catalog.next_n(3).await {
        match pending.request.clone() {
            Request::Movie(2) => pending.fail("500 Internal Server Error"),
            Request::Movie(id) => pending.ok(vec![movie(id, "Liked")]),
            other => panic!("unexpected request {:?}", other),
        }
    }

    let snapshot = wait_until(&core, |s| s.status(Pipeline::Liked) == PipelineStatus::Applied).await;
    assert_eq!(ids(&snapshot.liked_movies), vec![1, 3]);
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_hydration_fails_only_when_every_item_fails() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_liked(&[4, 5]);
    let core = start(&catalog, &store);

    core.select_tab(Tab::Liked);
    for pending in catalog.next_n(2).await {
        pending.fail("500 Internal Server Error");
    }

    let snapshot = wait_until(&core, |s| s.error.is_some()).await;
    let error = snapshot.error.unwrap();
    assert_eq!(error.source, Pipeline::Liked);
    assert_eq!(error.message, "Failed to load liked movies");
}

#[tokio::test(start_paused = true)]
async fn test_toggle_supersedes_in_flight_batch() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_liked(&[1]);
    let core = start(&catalog, &store);

    core.select_tab(Tab::Liked);
    let stale = catalog.next().await;
    assert_eq!(stale.request, Request::Movie(1));

    core.toggle_like(2);
    for pending in catalog.next_n(2).await {
        match pending.request.clone() {
            Request::Movie(id) => pending.ok(vec![movie(id, "Fresh")]),
            other => panic!("unexpected request {:?}", other),
        }
    }
    wait_until(&core, |s| s.liked_movies.len() == 2).await;

    stale.ok(vec![movie(1, "Stale")]);
    settle().await;

    let snapshot = core.snapshot();
    assert_eq!(ids(&snapshot.liked_movies), vec![1, 2]);
    assert!(snapshot.liked_movies.iter().all(|m| m.title == "Fresh"));
    assert_eq!(store.load_liked(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_off_tab_discards_in_flight_batch() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_liked(&[1]);
    let core = start(&catalog, &store);

    core.select_tab(Tab::Liked);
    let stale = catalog.next().await;
    assert_eq!(stale.request, Request::Movie(1));

    core.select_tab(Tab::Discover);
    assert!(!core.toggle_like(1));

    stale.ok(vec![movie(1, "Stale")]);
    settle().await;

    let snapshot = core.snapshot();
    assert!(snapshot.liked.is_empty());
    assert!(snapshot.liked_movies.is_empty());
    assert_eq!(snapshot.status(Pipeline::Liked), PipelineStatus::Idle);
    assert_eq!(catalog.held(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_leaving_liked_tab_discards_batch_and_return_refetches() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_liked(&[1]);
    let core = start(&catalog, &store);

    core.select_tab(Tab::Liked);
    let stale = catalog.next().await;
    core.select_tab(Tab::Discover);

    stale.ok(vec![movie(1, "Stale")]);
    settle().await;
    assert!(core.snapshot().liked_movies.is_empty());

    core.select_tab(Tab::Liked);
    catalog.next().await.ok(vec![movie(1, "Fresh")]);

    let snapshot = wait_until(&core, |s| !s.liked_movies.is_empty()).await;
    assert_eq!(snapshot.liked_movies[0].title, "Fresh");
}

#[tokio::test(start_paused = true)]
async fn test_hydration_not_triggered_outside_liked_tab() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    core.toggle_like(7);
    core.toggle_like(8);
    settle().await;

    assert_eq!(catalog.held(), 0);
    assert!(core.snapshot().liked_movies.is_empty());
}

// ============================================================================
// Recommendations
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_newer_recommend_supersedes_older() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    let core = start(&catalog, &store);

    core.toggle_like(1);
    let first = core.recommend().unwrap();
    let first_pending = catalog.next().await;

    core.toggle_like(2);
    core.set_top_k(3);
    let second = core.recommend().unwrap();
    let second_pending = catalog.next().await;
    assert_eq!(second_pending.request, Request::Recommend(vec![1, 2], 3));

    second_pending.ok(vec![movie(20, "Second")]);
    assert_eq!(second.await.unwrap(), Outcome::Applied);

    first_pending.ok(vec![movie(10, "First")]);
    assert_eq!(first.await.unwrap(), Outcome::Discarded);

    let snapshot = core.snapshot();
    assert_eq!(ids(&snapshot.recommendations), vec![20]);
    assert_eq!(snapshot.tab, Tab::Recommendations);
    assert_eq!(ids(&store.load_last_recommendations().unwrap()), vec![20]);
}

// ============================================================================
// Session reset
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_clears_state_and_discards_in_flight_results() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_last_recommendations(&[movie(50, "Old")]);
    let core = start(&catalog, &store);
    wait_until(&core, |s| !s.popular.is_empty()).await;

    core.toggle_like(1);
    core.toggle_like(2);
    core.set_search_query("q");
    let search = catalog.next().await;
    let recommend = core.recommend().unwrap();
    let recommend_pending = catalog.next().await;

    core.reset_session();

    let snapshot = core.snapshot();
    assert!(snapshot.liked.is_empty());
    assert!(snapshot.liked_movies.is_empty());
    assert!(snapshot.recommendations.is_empty());
    assert!(snapshot.search_results.is_empty());
    assert_eq!(snapshot.search_query, "");
    assert_eq!(snapshot.tab, Tab::Discover);
    assert_eq!(snapshot.loading, None);
    assert_eq!(ids(&snapshot.popular), vec![1, 2]);
    assert!(store.load_liked().is_empty());
    assert_eq!(store.load_last_recommendations(), None);

    search.ok(vec![movie(3, "Late search")]);
    recommend_pending.ok(vec![movie(4, "Late recommendation")]);
    assert_eq!(recommend.await.unwrap(), Outcome::Discarded);
    settle().await;

    let snapshot = core.snapshot();
    assert!(snapshot.search_results.is_empty());
    assert!(snapshot.recommendations.is_empty());
    assert_eq!(snapshot.tab, Tab::Discover);
    assert_eq!(store.load_last_recommendations(), None);
}

#[tokio::test(start_paused = true)]
async fn test_reset_session_is_restored_empty() {
    let catalog = GatedCatalog::new();
    let store = SessionStore::in_memory();
    store.save_liked(&[1, 2]);

    let core = start(&catalog, &store);
    core.reset_session();
    core.shutdown().await;

    let core = start(&catalog, &store);
    assert!(core.snapshot().liked.is_empty());
}

// ============================================================================
// Detail view
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_latest_detail_wins() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    let first = core.open_detail(1);
    let first_pending = catalog.next().await;
    let second = core.open_detail(2);
    let second_pending = catalog.next().await;

    second_pending.ok(vec![movie(2, "Second")]);
    assert_eq!(second.await.unwrap(), Outcome::Applied);
    first_pending.ok(vec![movie(1, "First")]);
    assert_eq!(first.await.unwrap(), Outcome::Discarded);

    let snapshot = core.snapshot();
    assert_eq!(snapshot.detail_id, Some(2));
    assert_eq!(snapshot.detail.unwrap().title, "Second");
}

#[tokio::test(start_paused = true)]
async fn test_closed_detail_discards_late_result() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    let handle = core.open_detail(3);
    let pending = catalog.next().await;
    core.close_detail();

    pending.ok(vec![movie(3, "Late")]);
    assert_eq!(handle.await.unwrap(), Outcome::Discarded);

    let snapshot = core.snapshot();
    assert_eq!(snapshot.detail_id, None);
    assert_eq!(snapshot.detail, None);
}

#[tokio::test(start_paused = true)]
async fn test_detail_not_found() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());

    let handle = core.open_detail(404);
    catalog.next().await.ok(Vec::new());
    assert_eq!(handle.await.unwrap(), Outcome::Failed);

    let snapshot = core.snapshot();
    assert_eq!(snapshot.error.unwrap().message, "movieId not found");
    assert_eq!(snapshot.detail, None);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_in_flight_results() {
    let catalog = GatedCatalog::new();
    let core = start(&catalog, &SessionStore::in_memory());
    let rx = core.subscribe();

    let handle = core.open_detail(5);
    let pending = catalog.next().await;

    core.shutdown().await;

    pending.ok(vec![movie(5, "After shutdown")]);
    assert_eq!(handle.await.unwrap(), Outcome::Discarded);
    assert_eq!(rx.borrow().detail, None);
}
