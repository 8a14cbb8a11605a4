use serde::Serialize;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Games with at least one live event stream in this process.
    pub streamed_games: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(streamed_games: usize) -> Self {
        Self {
            status: "ok".to_string(),
            streamed_games,
        }
    }

    /// Create a health response indicating the store cannot be reached.
    pub fn degraded(streamed_games: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            streamed_games,
        }
    }
}
