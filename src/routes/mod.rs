use axum::{Router, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    error::AppError,
    state::{SharedState, game::ParticipantId},
};

/// Game lifecycle and gameplay endpoints.
pub mod game;
/// Liveness and storage health.
pub mod health;
/// Per-game event stream.
pub mod sse;

/// Header carrying the caller's participant id.
pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// Compose all route trees and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(game::router())
        .with_state(state)
}

/// Participant identity resolved by the outer authentication layer and
/// forwarded in the `x-participant-id` header.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantIdentity(pub ParticipantId);

impl<S> FromRequestParts<S> for ParticipantIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PARTICIPANT_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {PARTICIPANT_HEADER} header")))?;
        let raw = value
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{PARTICIPANT_HEADER} is not valid text")))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::BadRequest(format!("{PARTICIPANT_HEADER} is not a UUID")))?;
        Ok(Self(id))
    }
}
