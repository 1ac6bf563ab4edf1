//! Duel Arena binary entrypoint wiring REST, WebSocket, SSE, and the storage supervisor.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duel_arena_back::{
    config::AppConfig,
    dao::duel_store::memory::InMemoryDuelStore,
    routes,
    services::{notifier, storage_supervisor},
    state::{AppState, SharedState, Storage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let notifier = notifier::from_config(&config);
    let app_state = AppState::new(config, notifier);

    install_storage(&app_state).await;
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the MongoDB supervisor when `MONGO_URI` is set, otherwise run on the in-memory store.
async fn install_storage(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    if let Ok(uri) = env::var("MONGO_URI") {
        let db_name = env::var("MONGO_DB").ok();
        tokio::spawn(storage_supervisor::run(state.clone(), move || {
            connect_mongo(uri.clone(), db_name.clone())
        }));
        return;
    }

    warn!("MONGO_URI not set; duels are kept in memory only");
    let store = InMemoryDuelStore::new();
    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let store = store.clone();
        async move { Ok(Storage::new(store)) }
    }));
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo(
    uri: String,
    db_name: Option<String>,
) -> Result<Storage, duel_arena_back::dao::storage::StorageError> {
    use duel_arena_back::dao::duel_store::mongodb::{MongoConfig, MongoDuelStore};

    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
    let store = MongoDuelStore::connect(config).await?;
    Ok(Storage::new(store))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
