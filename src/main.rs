use std::sync::Arc;

use movie_session::{
    config::Config,
    console,
    db::{create_redis_client, RedisStorage, SessionStore, StorageWriterHandle},
    services::{CatalogApi, HttpCatalog},
    SessionCore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "movie_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    let catalog: Arc<dyn CatalogApi> =
        Arc::new(HttpCatalog::new(&config.api_base_url, config.request_timeout())?);

    match catalog.health().await {
        Ok(health) => tracing::info!(
            api_url = %config.api_base_url,
            ok = health.ok,
            model_status = health.model_status.as_deref().unwrap_or("unknown"),
            "Recommendation service reachable"
        ),
        Err(e) => tracing::warn!(api_url = %config.api_base_url, error = %e, "Health check failed"),
    }

    // Redis keeps the session across restarts until its TTL; memory lasts for this process
    let (store, writer): (SessionStore, Option<StorageWriterHandle>) = match &config.redis_url {
        Some(redis_url) => {
            let client = create_redis_client(redis_url)?;
            let session_id = config.session_uuid()?;
            let (storage, writer) =
                RedisStorage::connect(client, session_id, config.session_ttl_secs).await?;
            println!("Session id: {} (set SESSION_ID to resume)", session_id);
            (SessionStore::new(Arc::new(storage)), Some(writer))
        }
        None => (SessionStore::in_memory(), None),
    };

    let core = SessionCore::start(catalog.clone(), store, config.core_settings());
    let printer = console::spawn_change_printer(core.subscribe());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = console::run(&core, catalog, stdin).await;

    core.shutdown().await;
    printer.abort();
    if let Some(writer) = writer {
        writer.shutdown().await;
    }

    result.map_err(Into::into)
}
