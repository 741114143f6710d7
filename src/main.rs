mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::error::ApiResponse;
use crate::services::{FileCipher, IngestPipeline};
use crate::storage::{BlobStore, LocalBlobStore};

// 10 files at 10MB each, plus multipart framing headroom
const UPLOAD_BODY_LIMIT: usize = 128 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub cipher: Arc<FileCipher>,
    pub store: Arc<dyn BlobStore>,
    pub pipeline: Arc<IngestPipeline>,
}

impl AppState {
    pub fn blob_timeout(&self) -> Duration {
        Duration::from_secs(self.config.storage.blob_timeout_secs)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultdrop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting vaultdrop...");

    // Load configuration; fails fast if the secret is absent
    let config = Arc::new(Config::load()?);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Derive the cipher key once; it is immutable for the process lifetime
    let cipher = Arc::new(FileCipher::new(&config.security.secret));

    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.storage.local_path));

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&cipher),
        Arc::clone(&store),
        Duration::from_secs(config.storage.blob_timeout_secs),
    ));

    let state = AppState {
        db,
        config: config.clone(),
        cipher,
        store,
        pipeline,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new()
        .route("/health", get(health))
        .route(
            "/files/public/share/:id",
            get(handlers::file::public_share_file),
        );

    let protected_routes = Router::new()
        .route(
            "/files",
            get(handlers::file::list_files),
        )
        .route(
            "/files/upload",
            post(handlers::file::upload_files).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/files/delete-many", post(handlers::file::delete_many_files))
        .route("/files/:id", delete(handlers::file::delete_file))
        .route("/files/:id/rename", patch(handlers::file::rename_file))
        .route("/files/:id/download", get(handlers::file::download_file))
        .route("/files/:id/thumbnail", get(handlers::file::get_thumbnail))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .nest("/api/v1", public_routes.merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}
