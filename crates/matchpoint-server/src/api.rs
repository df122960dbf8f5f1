use axum::Json;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use matchpoint_core::game::{GameType, SkillLevel, UserId};
use matchpoint_core::matchmaking::QueueStatus;
use matchpoint_core::session::SessionId;
use matchpoint_core::update::UpdateType;

use crate::coordinator::SessionInfo;
use crate::error::CoordinatorError;
use crate::state::AppState;

/// Resolved caller identity. Authentication is terminated upstream; the
/// gateway forwards the resolved user id in the `x-user-id` header.
pub struct UserIdentity(pub UserId);

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = CoordinatorError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
            .map(UserIdentity)
            .ok_or_else(|| {
                CoordinatorError::InvalidArgument("missing or malformed x-user-id header".to_string())
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinQueueBody {
    pub game_type: String,
    #[serde(default)]
    pub skill_level: SkillLevel,
}

/// POST /api/v1/queue/join — enqueue and attempt an immediate match.
pub async fn join_queue(
    State(state): State<AppState>,
    UserIdentity(user_id): UserIdentity,
    Json(body): Json<JoinQueueBody>,
) -> Result<Json<QueueStatus>, CoordinatorError> {
    let status = state
        .matchmaking
        .join_queue(user_id, &body.game_type, body.skill_level)?;
    Ok(Json(status))
}

/// POST /api/v1/queue/leave — always succeeds.
pub async fn leave_queue(
    State(state): State<AppState>,
    UserIdentity(user_id): UserIdentity,
) -> Json<QueueStatus> {
    Json(state.matchmaking.leave_queue(user_id))
}

/// GET /api/v1/queue/status
pub async fn queue_status(
    State(state): State<AppState>,
    UserIdentity(user_id): UserIdentity,
) -> Json<QueueStatus> {
    Json(state.matchmaking.queue_status(user_id))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub game_type: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

/// POST /api/v1/sessions — create a non-matchmade session with the caller
/// seated first.
pub async fn create_session(
    State(state): State<AppState>,
    UserIdentity(user_id): UserIdentity,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), CoordinatorError> {
    let game_type = GameType::from_str_opt(body.game_type.trim()).ok_or_else(|| {
        CoordinatorError::InvalidArgument(format!("unknown game type: {}", body.game_type))
    })?;
    let session_id = state
        .coordinator
        .create_session(game_type, user_id)
        .map_err(|e| CoordinatorError::Internal(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

/// POST /api/v1/sessions/{id}/join
pub async fn join_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    UserIdentity(user_id): UserIdentity,
) -> Result<StatusCode, CoordinatorError> {
    state.coordinator.join_session(session_id, user_id)?;
    Ok(StatusCode::OK)
}

/// GET /api/v1/sessions/{id} — participant-only snapshot.
pub async fn session_info(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    UserIdentity(user_id): UserIdentity,
) -> Result<Json<SessionInfo>, CoordinatorError> {
    state.tracker.touch(user_id);
    Ok(Json(state.coordinator.session_info(session_id, user_id)?))
}

#[derive(Debug, Deserialize)]
pub struct ApplyMoveBody {
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    #[serde(default)]
    pub payload: Value,
}

/// POST /api/v1/sessions/{id}/moves
pub async fn apply_move(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    UserIdentity(user_id): UserIdentity,
    Json(body): Json<ApplyMoveBody>,
) -> Result<StatusCode, CoordinatorError> {
    state.tracker.touch(user_id);
    state
        .coordinator
        .apply_move(session_id, user_id, body.update_type, body.payload)?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionBody {
    pub winner_id: Option<UserId>,
}

/// POST /api/v1/sessions/{id}/end — forced termination; a missing winner
/// voids the session.
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    UserIdentity(_user_id): UserIdentity,
    Json(body): Json<EndSessionBody>,
) -> Result<StatusCode, CoordinatorError> {
    state.coordinator.end_session(session_id, body.winner_id)?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectBody {
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub connection_id: String,
}

/// POST /api/v1/sessions/{id}/connect — register a transport connection
/// for the caller. Generates a connection id when the transport did not
/// supply one.
pub async fn connect(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    UserIdentity(user_id): UserIdentity,
    Json(body): Json<ConnectBody>,
) -> Result<Json<ConnectResponse>, CoordinatorError> {
    let connection_id = body
        .connection_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    state
        .coordinator
        .handle_player_connection(session_id, user_id, &connection_id)?;
    Ok(Json(ConnectResponse { connection_id }))
}

#[derive(Debug, Deserialize)]
pub struct DisconnectBody {
    pub connection_id: String,
}

/// POST /api/v1/sessions/{id}/disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    UserIdentity(user_id): UserIdentity,
    Json(body): Json<DisconnectBody>,
) -> Result<StatusCode, CoordinatorError> {
    state
        .coordinator
        .handle_player_disconnection(session_id, user_id, &body.connection_id)?;
    Ok(StatusCode::OK)
}
