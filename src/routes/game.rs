use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::game::{
        CreateGameRequest, GameResults, GameSummary, JoinGameRequest, JoinGameResponse,
        QuitGameRequest, SubmissionAck, SubmitAnswerRequest, TaskSnapshot,
    },
    error::AppError,
    routes::ParticipantIdentity,
    services::{game_service, play_service},
    state::SharedState,
};

/// Routes handling the game lifecycle, from creation to quitting.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/join", post(join_game))
        .route("/games/{id}", get(game_summary))
        .route("/games/{id}/results", get(game_results))
        .route("/games/{id}/answers", post(submit_answer))
        .route("/games/{id}/advance", post(advance))
        .route("/games/{id}/quit", post(quit))
}

/// Create a game hosted by the caller.
pub async fn create_game(
    State(state): State<SharedState>,
    ParticipantIdentity(host): ParticipantIdentity,
    Json(payload): Json<CreateGameRequest>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = game_service::create_game(&state, host, payload).await?;
    Ok(Json(summary))
}

/// Join an active game through its PIN.
pub async fn join_game(
    State(state): State<SharedState>,
    ParticipantIdentity(player): ParticipantIdentity,
    Json(payload): Json<JoinGameRequest>,
) -> Result<Json<JoinGameResponse>, AppError> {
    let joined = game_service::join_game(&state, player, payload).await?;
    Ok(Json(joined))
}

/// Snapshot of a game as seen by the caller.
pub async fn game_summary(
    State(state): State<SharedState>,
    ParticipantIdentity(viewer): ParticipantIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = game_service::game_summary(&state, id, viewer).await?;
    Ok(Json(summary))
}

/// Final standings of a finished game.
pub async fn game_results(
    State(state): State<SharedState>,
    ParticipantIdentity(viewer): ParticipantIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<GameResults>, AppError> {
    let results = game_service::game_results(&state, id, viewer).await?;
    Ok(Json(results))
}

/// Submit the caller's answer to the open question.
pub async fn submit_answer(
    State(state): State<SharedState>,
    ParticipantIdentity(player): ParticipantIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmissionAck>, AppError> {
    let ack = play_service::submit_answer(&state, id, player, payload.answer).await?;
    Ok(Json(ack))
}

/// Host command moving the game to its next task.
pub async fn advance(
    State(state): State<SharedState>,
    ParticipantIdentity(host): ParticipantIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskSnapshot>, AppError> {
    let snapshot = play_service::advance(&state, id, host).await?;
    Ok(Json(snapshot))
}

/// Host command ending the game.
pub async fn quit(
    State(state): State<SharedState>,
    ParticipantIdentity(host): ParticipantIdentity,
    Path(id): Path<Uuid>,
    payload: Option<Json<QuitGameRequest>>,
) -> Result<Json<TaskSnapshot>, AppError> {
    let status = payload.map(|Json(body)| body.status).unwrap_or_default();
    let snapshot = play_service::quit(&state, id, host, status.into()).await?;
    Ok(Json(snapshot))
}
