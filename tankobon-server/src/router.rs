//! Route composition.

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::require_admin;
use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/feeds/:state_id/sync", post(handlers::sync_feed))
        .route("/admin/feeds/:state_id/peek", get(handlers::peek_feed))
        .route("/admin/feeds/:state_id/deltas", get(handlers::feed_deltas))
        .route("/admin/lookup", get(handlers::lookup))
        .route("/admin/stats", get(handlers::stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(admin_routes)
        .with_state(state)
}
