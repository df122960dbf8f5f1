pub mod api;
pub mod config;
pub mod connections;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod health;
pub mod matchmaking;
pub mod notifier;
pub mod scheduler;
pub mod state;
pub mod store;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/queue/join", post(api::join_queue))
        .route("/queue/leave", post(api::leave_queue))
        .route("/queue/status", get(api::queue_status))
        .route("/sessions", post(api::create_session))
        .route("/sessions/{session_id}", get(api::session_info))
        .route("/sessions/{session_id}/join", post(api::join_session))
        .route("/sessions/{session_id}/moves", post(api::apply_move))
        .route("/sessions/{session_id}/end", post(api::end_session))
        .route("/sessions/{session_id}/connect", post(api::connect))
        .route("/sessions/{session_id}/disconnect", post(api::disconnect));

    let app = Router::new()
        .route("/healthz", get(health::health_check))
        .route("/readyz", get(health::readiness_check))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}
