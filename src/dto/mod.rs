use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Payloads published on the per-game event stream.
pub mod events;
/// REST request and response bodies for games.
pub mod game;
/// Health check response.
pub mod health;
/// Server-sent event framing.
pub mod sse;
/// Input validation helpers shared by request bodies.
pub mod validation;

/// Render a timestamp as RFC 3339 for client payloads.
pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
