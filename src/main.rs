use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use cinetrailers::{
    api::{create_router, AppState},
    auth::{AuthProvider, FirebaseAuth, MemoryAuth},
    config::Config,
    db::{create_redis_client, Cache, CacheWriterHandle},
    notify::NoticeBoard,
    services::TmdbProvider,
    session::Session,
    settings::SettingsStore,
    store::{DocumentStore, FirestoreStore, MemoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let (auth, store): (Arc<dyn AuthProvider>, Arc<dyn DocumentStore>) = match config.firebase()
    {
        Some((api_key, project_id)) => {
            let auth: Arc<dyn AuthProvider> = Arc::new(FirebaseAuth::new(api_key.to_string()));
            let store = FirestoreStore::new(
                project_id,
                api_key.to_string(),
                auth.clone(),
                Duration::from_millis(config.firestore_poll_interval_ms),
            );
            tracing::info!(project_id = %project_id, "Using Firebase backends");
            (auth, Arc::new(store))
        }
        None => {
            tracing::warn!("Firebase not configured, using in-memory auth and store");
            (Arc::new(MemoryAuth::new()), Arc::new(MemoryStore::new()))
        }
    };

    let (cache, cache_writer) = connect_cache(config.redis_url.as_deref()).await;

    let settings = Arc::new(
        SettingsStore::load(config.settings_path.clone(), config.tmdb_api_key.clone()).await,
    );
    let catalog = Arc::new(TmdbProvider::new(
        settings.clone(),
        cache,
        config.tmdb_api_url.clone(),
        config.tmdb_language.clone(),
        config.tmdb_fallback_language.clone(),
    ));

    let notices = Arc::new(NoticeBoard::default());
    let session = Arc::new(Session::new(auth, store, notices.clone()));
    session.start();

    let app = create_router(AppState::new(session.clone(), catalog, settings, notices));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    session.shutdown();
    if let Some(writer) = cache_writer {
        writer.shutdown().await;
    }
    Ok(())
}

/// Connects the optional catalog cache; failures only disable caching
async fn connect_cache(redis_url: Option<&str>) -> (Option<Cache>, Option<CacheWriterHandle>) {
    let Some(url) = redis_url.filter(|u| !u.is_empty()) else {
        tracing::info!("REDIS_URL not set, catalog responses are not cached");
        return (None, None);
    };

    match create_redis_client(url) {
        Ok(client) => {
            let (cache, writer) = Cache::new(client).await;
            tracing::info!("Catalog cache enabled");
            (Some(cache), Some(writer))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Invalid REDIS_URL, catalog responses are not cached");
            (None, None)
        }
    }
}
