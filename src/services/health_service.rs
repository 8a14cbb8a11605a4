use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report whether the backend can serve games.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let streamed_games = state.events().channel_count();
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(streamed_games),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded(streamed_games)
        }
    }
}
