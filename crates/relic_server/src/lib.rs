//! HTTP server wiring for the Relic admin surface (backup API, maintenance jobs, shared state).

/// HTTP error mapping for API handlers.
pub mod error;
/// HTTP handlers for health and backup endpoints.
pub mod handlers;
/// Scheduled backup/cleanup jobs and lifecycle snapshots.
pub mod maintenance;

pub use relic_core::{
    backup, config, AppError, BackupConfig, BackupError, Config, JobRegistry, DEFAULT_PORT,
};

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use relic_core::backup::{BackupProducer, DumpSource, SnapshotStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::CorsLayer,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

/// Shared state passed to HTTP handlers and maintenance jobs.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SnapshotStore>,
    pub producer: Arc<BackupProducer>,
    pub jobs: JobRegistry,
}

impl AppState {
    /// Construct shared application state.
    ///
    /// # Arguments
    /// - `config`: Loaded configuration.
    /// - `store`: Snapshot store backups are written to.
    /// - `source`: Database dump source.
    ///
    /// # Returns
    /// A new [`AppState`] with a fresh job registry.
    pub fn new(config: Config, store: Arc<dyn SnapshotStore>, source: Arc<dyn DumpSource>) -> Self {
        let producer = BackupProducer::new(store.clone(), source, config.backup.prefix.clone());
        Self::with_producer(config, store, producer, JobRegistry::new())
    }

    /// Construct shared application state from prebuilt parts.
    pub fn with_producer(
        config: Config,
        store: Arc<dyn SnapshotStore>,
        producer: BackupProducer,
        jobs: JobRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            producer: Arc::new(producer),
            jobs,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.config.backup.prefix
    }
}

/// Create the application router with all routes and middleware.
///
/// # Arguments
/// - `state`: Shared application state.
/// - `allow_public_access`: Whether to allow cross-origin requests from any origin.
///
/// # Returns
/// Configured `axum::Router`.
pub fn create_app(state: AppState, allow_public_access: bool) -> Router {
    let cors_port = state.config.port;
    create_app_with_cors_port(state, allow_public_access, cors_port)
}

/// Resolve the listener address from env var overrides and security policy.
///
/// # Arguments
/// - `config`: Server configuration containing the configured `port`.
/// - `allow_public_access`: Whether non-loopback bind targets are permitted.
///
/// # Returns
/// A validated socket address that enforces loopback when public access is disabled.
pub fn resolve_bind_address(config: &Config, allow_public_access: bool) -> SocketAddr {
    let default_bind = SocketAddr::from(([127, 0, 0, 1], config.port));
    let requested = match std::env::var("BIND") {
        Ok(value) => match value.trim().parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(
                    "Invalid BIND='{}': {}. Falling back to {}",
                    value,
                    err,
                    default_bind
                );
                default_bind
            }
        },
        Err(_) => default_bind,
    };

    if allow_public_access || requested.ip().is_loopback() {
        return requested;
    }

    tracing::warn!(
        "Non-loopback bind {} requested without ALLOW_PUBLIC_ACCESS; forcing 127.0.0.1",
        requested
    );
    SocketAddr::from(([127, 0, 0, 1], requested.port()))
}

fn local_origins(cors_port: u16) -> Vec<HeaderValue> {
    [
        format!("http://localhost:{}", cors_port),
        format!("http://127.0.0.1:{}", cors_port),
    ]
    .into_iter()
    .filter_map(|origin| HeaderValue::from_str(&origin).ok())
    .collect()
}

fn create_app_with_cors_port(state: AppState, allow_public_access: bool, cors_port: u16) -> Router {
    let methods = [Method::GET, Method::POST];
    let cors = if allow_public_access {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        CorsLayer::new()
            .allow_origin(local_origins(cors_port))
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
    };

    // Backups are already gzip; recompressing them only burns CPU.
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new().and(NotForContentType::const_new("application/gzip")),
    );

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/version", get(handlers::health::version))
        .route("/api/v1/admin/config", get(handlers::backup::get_config))
        .route(
            "/api/v1/admin/backups",
            get(handlers::backup::list_backups).post(handlers::backup::create_backup),
        )
        .route(
            "/api/v1/admin/backups/retention",
            get(handlers::backup::retention_preview),
        )
        .route(
            "/api/v1/admin/backups/cleanup",
            post(handlers::backup::run_cleanup),
        )
        .route(
            "/api/v1/admin/backups/:filename/download",
            get(handlers::backup::download_backup),
        )
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(compression)
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
}

fn listener_cors_port(listener: &tokio::net::TcpListener, fallback_port: u16) -> u16 {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(fallback_port)
}

/// Run the Axum server with graceful shutdown support.
///
/// # Arguments
/// - `listener`: Bound TCP listener for the server.
/// - `state`: Shared application state.
/// - `allow_public_access`: Whether to allow cross-origin requests from any origin.
/// - `shutdown_signal`: Future that resolves when shutdown should start.
///
/// # Errors
/// Returns any I/O error produced by `axum::serve`.
pub async fn serve_router(
    listener: tokio::net::TcpListener,
    state: AppState,
    allow_public_access: bool,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let cors_port = listener_cors_port(&listener, state.config.port);
    let app = create_app_with_cors_port(state, allow_public_access, cors_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}
