use std::time::SystemTime;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{self, BoxFuture};

use crate::{
    dao::{
        game_store::GameStore,
        storage::{StorageError, StorageResult},
    },
    state::{
        game::{Game, GameId, GameStatus},
        task::{Task, TaskStatus, TaskType},
    },
};

/// Process-local game store, used for single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryGameStore {
    games: DashMap<GameId, Game>,
    active_pins: DashMap<String, GameId>,
}

impl InMemoryGameStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, game: Game) -> StorageResult<Game> {
        match self.active_pins.entry(game.pin.clone()) {
            Entry::Occupied(_) => {
                return Err(StorageError::Duplicate {
                    what: format!("pin {}", game.pin),
                });
            }
            Entry::Vacant(slot) => {
                if self.games.contains_key(&game.id) {
                    return Err(StorageError::Duplicate {
                        what: format!("game {}", game.id),
                    });
                }
                slot.insert(game.id);
            }
        }
        self.games.insert(game.id, game.clone());
        Ok(game)
    }

    fn replace(&self, mut game: Game) -> StorageResult<Game> {
        let Some(mut stored) = self.games.get_mut(&game.id) else {
            return Err(StorageError::NotFound { id: game.id });
        };
        if stored.version != game.version {
            return Err(StorageError::Conflict {
                id: game.id,
                expected: game.version,
                actual: Some(stored.version),
            });
        }
        // terminal status is monotonic
        if stored.status.is_terminal() && stored.status != game.status {
            return Err(StorageError::Conflict {
                id: game.id,
                expected: game.version,
                actual: Some(stored.version),
            });
        }

        game.version += 1;
        *stored = game.clone();
        drop(stored);

        if game.status.is_terminal() {
            self.release_pin(&game);
        }
        Ok(game)
    }

    fn release_pin(&self, game: &Game) {
        self.active_pins
            .remove_if(&game.pin, |_, owner| *owner == game.id);
    }

    fn stale_ids(&self, before: SystemTime, podium: bool) -> Vec<GameId> {
        self.games
            .iter()
            .filter(|entry| {
                let game = entry.value();
                let on_podium = game.current_task.task_type() == TaskType::Podium;
                let quit = game.current_task.task_type() == TaskType::Quit;
                game.status == GameStatus::Active
                    && game.updated < before
                    && if podium { on_podium } else { !on_podium && !quit }
            })
            .map(|entry| *entry.key())
            .collect()
    }

    fn bulk_update(
        &self,
        ids: &[GameId],
        status: GameStatus,
        before: SystemTime,
        now: SystemTime,
    ) -> u64 {
        let mut updated = 0;
        for id in ids {
            let Some(mut game) = self.games.get_mut(id) else {
                continue;
            };
            let task_type = game.current_task.task_type();
            let eligible = match status {
                GameStatus::Completed => task_type == TaskType::Podium,
                GameStatus::Expired => !matches!(task_type, TaskType::Podium | TaskType::Quit),
                GameStatus::Active => false,
            };
            if !eligible || game.status != GameStatus::Active || game.updated >= before {
                continue;
            }
            game.status = status;
            if status == GameStatus::Completed {
                if let Task::Podium(podium) = &mut game.current_task {
                    podium.status = TaskStatus::Completed;
                }
            }
            game.updated = now;
            game.version += 1;
            let snapshot = game.clone();
            drop(game);
            self.release_pin(&snapshot);
            updated += 1;
        }
        updated
    }
}

impl GameStore for InMemoryGameStore {
    fn create_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>> {
        Box::pin(future::ready(self.insert(game)))
    }

    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let game = self.games.get(&id).map(|entry| entry.value().clone());
        Box::pin(future::ready(Ok(game)))
    }

    fn find_active_game_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let game = self
            .active_pins
            .get(&pin)
            .and_then(|id| self.games.get(id.value()).map(|entry| entry.value().clone()))
            .filter(|game| game.status == GameStatus::Active);
        Box::pin(future::ready(Ok(game)))
    }

    fn save_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>> {
        Box::pin(future::ready(self.replace(game)))
    }

    fn find_stale_podium_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>> {
        Box::pin(future::ready(Ok(self.stale_ids(before, true))))
    }

    fn find_stale_active_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>> {
        Box::pin(future::ready(Ok(self.stale_ids(before, false))))
    }

    fn update_game_statuses(
        &self,
        ids: Vec<GameId>,
        status: GameStatus,
        before: SystemTime,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        Box::pin(future::ready(Ok(self.bulk_update(&ids, status, before, now))))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}
