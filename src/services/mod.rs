/// Fan-out of projected events to the per-game hubs.
pub mod dispatch;
/// Game creation, joining and read models.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Answers, host commands, question closing and deadline timers.
pub mod play_service;
/// Host and player views of task transitions.
pub mod projector;
/// Periodic lifecycle jobs.
pub mod scheduler;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
