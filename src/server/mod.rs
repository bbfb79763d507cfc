//! HTTP API
//!
//! axum router over [`AppState`]. JSON endpoints live under `/api`; public
//! share links are served from `/s/:link` as redirects to Telegram.

mod error;
mod handlers;
mod state;

pub use handlers::FileView;
pub use state::AppState;

use crate::chunk::Sweeper;
use crate::config::Config;
use crate::error::Result;
use crate::metadata::RecordStore;
use crate::telegram::MediaRelay;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Body limit for `POST /api/upload`
pub(crate) fn upload_body_limit(max_upload_size: u64) -> usize {
    to_usize(max_upload_size).saturating_add(MULTIPART_OVERHEAD)
}

/// Body limit for one base64 chunk wrapped in JSON
pub(crate) fn chunk_body_limit(max_upload_size: u64) -> usize {
    (to_usize(max_upload_size) / 3)
        .saturating_mul(4)
        .saturating_add(MULTIPART_OVERHEAD)
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let max_upload_size = state.config.server.max_upload_size;

    let api = Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .route(
            "/upload",
            post(handlers::upload)
                .layer(DefaultBodyLimit::max(upload_body_limit(max_upload_size))),
        )
        .route(
            "/upload-chunked",
            post(handlers::upload_chunk)
                .layer(DefaultBodyLimit::max(chunk_body_limit(max_upload_size))),
        )
        .route("/upload-chunked/:session_id", delete(handlers::abort_upload))
        .route("/files", get(handlers::list_files))
        .route("/files/:id", get(handlers::get_file).delete(handlers::delete_file))
        .route("/share/:link", get(handlers::share_info));

    Router::new()
        .nest("/api", api)
        .route("/s/:link", get(handlers::share_redirect))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Run the HTTP service until `shutdown` resolves
pub async fn serve<F>(
    config: Config,
    store: RecordStore,
    relay: Arc<dyn MediaRelay>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let sweep_every = Duration::from_secs(config.upload.sweep_interval_secs);

    let state = AppState::new(config, store, relay);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    let sweeper = Sweeper::spawn(state.sessions.clone(), sweep_every);
    let app = create_router(state.clone());

    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;

    sweeper.stop().await;
    state.store.flush().await?;
    served?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
