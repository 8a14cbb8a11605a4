use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use uuid::Uuid;

use crate::{
    error::AppError, routes::ParticipantIdentity, services::sse_service, state::SharedState,
};

/// Stream the events of one game addressed to the caller.
pub async fn game_stream(
    State(state): State<SharedState>,
    ParticipantIdentity(participant): ParticipantIdentity,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe(&state, id, participant).await?;
    Ok(sse_service::to_sse_stream(subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/games/{id}/events", get(game_stream))
}
