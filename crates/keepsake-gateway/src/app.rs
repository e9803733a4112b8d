use std::sync::Arc;

use axum::{routing::get, Router};
use keepsake_core::KeepsakeConfig;
use keepsake_delivery::ReleaseExecutor;
use tower_http::trace::TraceLayer;

/// Shared state, passed as `Arc<AppState>` to every handler.
pub struct AppState {
    pub config: KeepsakeConfig,
    pub executor: Arc<ReleaseExecutor>,
}

impl AppState {
    pub fn new(config: KeepsakeConfig, executor: Arc<ReleaseExecutor>) -> Self {
        Self { config, executor }
    }
}

/// Assemble the redemption portal router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let view_route = format!("{}/{{token}}", state.config.delivery.link_path.trim_end_matches('/'));
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(&view_route, get(crate::http::view::view_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
