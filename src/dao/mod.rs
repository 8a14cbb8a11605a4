/// Game aggregate persistence.
pub mod game_store;
/// Named leases guarding background jobs.
pub mod lock;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Per-question answer ledgers.
pub mod submissions;
