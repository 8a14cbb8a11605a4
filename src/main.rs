//! Live Quiz Back binary entrypoint wiring REST, SSE, the lifecycle scheduler and storage.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use live_quiz_back::{
    config::{AppConfig, ServerSettings, StoreKind},
    routes,
    services::scheduler,
    state::{AppState, Collaborators, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let settings = ServerSettings::from_env();

    let collaborators = build_collaborators(settings.store).await?;
    let app_state = AppState::new(collaborators, config);

    let expiry_job = scheduler::spawn_expiry_job(app_state.clone());
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!(%addr, store = ?settings.store, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    expiry_job.abort();
    Ok(())
}

/// Connect the configured storage backend.
async fn build_collaborators(store: StoreKind) -> anyhow::Result<Collaborators> {
    match store {
        StoreKind::Memory => {
            info!("using in-memory storage; games are lost on restart");
            Ok(Collaborators::in_memory())
        }
        StoreKind::Mongo => connect_mongo().await,
    }
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> anyhow::Result<Collaborators> {
    use std::sync::Arc;

    use live_quiz_back::{
        dao::game_store::mongodb::{MongoConfig, MongoGameStore, MongoLock, MongoSubmissionTracker},
        state::clock::SystemClock,
    };

    let mongo_config = MongoConfig::from_env()
        .await
        .context("reading MongoDB configuration")?;
    let store = MongoGameStore::connect(mongo_config)
        .await
        .context("connecting to MongoDB")?;

    let lock = MongoLock::new(store.database());
    let tracker = MongoSubmissionTracker::new(store.database());
    Ok(Collaborators {
        store: Arc::new(store),
        tracker: Arc::new(tracker),
        lock: Arc::new(lock),
        clock: Arc::new(SystemClock),
    })
}

#[cfg(not(feature = "mongo-store"))]
async fn connect_mongo() -> anyhow::Result<Collaborators> {
    anyhow::bail!("STORE=mongo requires the mongo-store feature")
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
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
