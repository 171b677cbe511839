//! Axum-based HTTP gateway for the catalog API.
//!
//! - Token auth endpoints under `/auth/token` (`auth`)
//! - Catalog endpoints under `/livros` and cover files under `/capas` (`books`)
//! - Request body size limit and request timeout from `[gateway]` config
//! - Refuses to bind a public address unless explicitly allowed

pub mod auth;
pub mod books;

use crate::auth::{AuthService, AuthStore, PasswordHasher};
use crate::books::BookStore;
use crate::config::{Config, GatewayConfig};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Generic body returned with every 500; details go to the log only.
pub(crate) const INTERNAL_ERROR_MSG: &str = "Erro interno do servidor.";

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub books: Arc<BookStore>,
    /// Directory where uploaded covers are written and served from.
    pub covers_dir: Arc<PathBuf>,
}

impl AppState {
    /// Create the data directories and open both stores on the shared database.
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data dir {}", config.data_dir.display())
        })?;
        let covers_dir = config.covers_path();
        std::fs::create_dir_all(&covers_dir)
            .with_context(|| format!("Failed to create covers dir {}", covers_dir.display()))?;

        let db_path = config.database_path();
        let auth_store = Arc::new(AuthStore::open(&db_path)?);
        let books = Arc::new(BookStore::open(&db_path)?);
        tracing::info!(path = %db_path.display(), "Database opened");

        let hasher = PasswordHasher::new(config.auth.hash_iterations);
        Ok(Self {
            auth: Arc::new(AuthService::new(auth_store, hasher)),
            books,
            covers_dir: Arc::new(covers_dir),
        })
    }
}

/// True if `host` would expose the gateway beyond the local machine.
pub fn is_public_bind(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return false;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => !ip.is_loopback(),
        Err(_) => true,
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState, gateway: &GatewayConfig) -> Router {
    // ── CORS: the web client is served from another origin ──
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/auth/token",
            get(auth::handle_resolve)
                .post(auth::handle_authenticate)
                .put(auth::handle_change_password)
                .delete(auth::handle_revoke),
        )
        .route(
            "/livros/lista",
            get(books::handle_list).delete(books::handle_delete_many),
        )
        .route("/livros/livro", axum::routing::post(books::handle_create))
        .route(
            "/livros/livro/{id}",
            get(books::handle_get).put(books::handle_update),
        )
        .route("/livros/categorias", get(books::handle_categories))
        .route("/capas/{file}", get(books::handle_cover))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(gateway.max_body_bytes))
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        ))
}

/// Open the stores and serve until Ctrl-C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let host = config.gateway.host.as_str();
    let port = config.gateway.port;

    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "Refusing to bind to {host}: the API would be reachable from other machines.\n\
             Fix: use --host 127.0.0.1 (default) or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }

    let state = AppState::open(&config)?;

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual = listener.local_addr()?;
    tracing::info!(addr = %actual, "Gateway listening");

    let app = router(state, &config.gateway);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// GET /health
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
