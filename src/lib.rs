//! Library crate for live-quiz-back, exposing modules for the binary and integration tests.

pub mod config;
/// Persistence: game store, submission tracker and job locks.
pub mod dao;
/// Request, response and event payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Axum routers for the REST and SSE surface.
pub mod routes;
pub mod scoring;
/// Use cases driving games from creation to podium.
pub mod services;
/// Shared application state and the game domain model.
pub mod state;
