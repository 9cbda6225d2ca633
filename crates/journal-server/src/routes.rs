//! API Routes

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Journal entries
        .route("/create/journal-entry", post(handlers::create_journal_entry))
        .route("/update/journal-entry", post(handlers::update_journal_entry))
        .route("/delete/journal-entry", post(handlers::delete_journal_entry))
        .route("/fetch/journ-entries", get(handlers::fetch_journal_entries))
        // Counter
        .route("/initialize-counter", post(handlers::initialize_counter))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
