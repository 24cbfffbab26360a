//! Quiz Arena Back binary entrypoint wiring REST, WebSocket, SSE and result storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_arena_back::{
    config::AppConfig,
    dao::{
        ledger::{HttpLedger, SettlementLedger},
        question_bank::{QuestionBank, StaticQuestionBank},
        result_store::{ResultStore, memory::MemoryResultStore},
        storage::StorageError,
    },
    routes,
    services::{session_sweeper, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let questions: Arc<dyn QuestionBank> = match &config.questions_path {
        Some(path) => Arc::new(
            StaticQuestionBank::from_path(path)
                .with_context(|| format!("loading question bank `{}`", path.display()))?,
        ),
        None => Arc::new(StaticQuestionBank::builtin().context("loading built-in question bank")?),
    };
    info!(categories = ?questions.categories(), "question bank ready");

    let ledger: Option<Arc<dyn SettlementLedger>> = match &config.settlement.endpoint {
        Some(endpoint) => Some(Arc::new(
            HttpLedger::new(endpoint.clone(), config.settlement.request_timeout)
                .context("building settlement ledger client")?,
        )),
        None => {
            warn!("no settlement endpoint configured; final scores stay pending");
            None
        }
    };

    let app_state = AppState::new(config, questions, ledger);

    spawn_storage_supervisor(app_state.clone());
    tokio::spawn(session_sweeper::run(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the supervisor for the backend named by `STORAGE_BACKEND` (`memory` by default).
fn spawn_storage_supervisor(state: SharedState) {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".into());
    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use quiz_arena_back::dao::result_store::mongodb::{MongoConfig, MongoResultStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoResultStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ResultStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use quiz_arena_back::dao::result_store::couchdb::{CouchConfig, CouchResultStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchResultStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn ResultStore>)
            }));
        }
        other => {
            if other != "memory" {
                warn!(backend = other, "unknown storage backend; using in-memory results");
            }
            tokio::spawn(storage_supervisor::run(state, || async {
                Ok::<_, StorageError>(Arc::new(MemoryResultStore::new()) as Arc<dyn ResultStore>)
            }));
        }
    }
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

        let Ok(mut term) = signal(SignalKind::terminate()) else {
            warn!("failed to install SIGTERM handler; only Ctrl+C stops the server");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
