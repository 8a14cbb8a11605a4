/// Process-local store.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::{
    dao::storage::StorageResult,
    state::game::{Game, GameId, GameStatus},
};

pub use memory::InMemoryGameStore;

/// Abstraction over the persistence layer for game aggregates.
pub trait GameStore: Send + Sync {
    /// Insert a brand-new game. Fails with `Duplicate` when its PIN is held by another active game.
    fn create_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>>;
    /// Load a game by id.
    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Game>>>;
    /// The active game holding `pin`, if any.
    fn find_active_game_by_pin(&self, pin: String)
    -> BoxFuture<'static, StorageResult<Option<Game>>>;
    /// Persist `game` if its `version` still matches the stored one.
    ///
    /// Returns the saved game with its version bumped, or `Conflict` when
    /// another writer got there first.
    fn save_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>>;
    /// Active games sitting on their podium since before `before`.
    fn find_stale_podium_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>>;
    /// Active games neither on their podium nor quit, untouched since before `before`.
    fn find_stale_active_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>>;
    /// Move the listed games to `status`, skipping any that are no longer active,
    /// were touched since `before`, or whose current task no longer qualifies
    /// (`Completed` needs a podium, `Expired` anything but podium or quit).
    /// Returns how many were updated.
    fn update_game_statuses(
        &self,
        ids: Vec<GameId>,
        status: GameStatus,
        before: SystemTime,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
