use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub matchmaking: MatchmakingInfo,
    pub sessions: SessionsInfo,
    pub connections: ConnectionsInfo,
}

#[derive(Serialize)]
pub struct MatchmakingInfo {
    pub queued_players: usize,
}

#[derive(Serialize)]
pub struct SessionsInfo {
    pub live: usize,
    pub in_progress: usize,
}

#[derive(Serialize)]
pub struct ConnectionsInfo {
    pub connected_users: usize,
}

/// GET /healthz — server status plus queue, session, and presence counts.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.coordinator.stats();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        matchmaking: MatchmakingInfo {
            queued_players: state.matchmaking.queued_players(),
        },
        sessions: SessionsInfo {
            live: stats.live,
            in_progress: stats.in_progress,
        },
        connections: ConnectionsInfo {
            connected_users: state.tracker.connected_users(),
        },
    })
}

/// GET /readyz — verifies essential subsystems are initialized.
pub async fn readiness_check(State(state): State<AppState>) -> &'static str {
    if state.coordinator.rules().registered_games() == 0 {
        return "not ready: no game rules registered";
    }
    "ready"
}
