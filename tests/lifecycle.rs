//! Stale game sweep and job lock behaviour.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use live_quiz_back::{
    dao::{
        game_store::{GameStore, InMemoryGameStore},
        lock::{DistributedLock, InMemoryLock},
    },
    services::scheduler::{self, GAME_EXPIRY_JOB, PeriodicJob, SweepReport},
    state::{
        game::{Game, GameMode, GameSettings, GameStatus},
        task::{PodiumTask, Task, TaskStatus},
    },
};
use uuid::Uuid;

const STALE_AFTER: Duration = Duration::from_secs(3600);

fn game_at(pin: &str, updated: SystemTime) -> Game {
    let mut game = Game::new(
        pin.to_string(),
        GameMode::Classic,
        Uuid::new_v4(),
        Vec::new(),
        GameSettings::default(),
        updated,
    );
    game.updated = updated;
    game
}

fn on_podium(mut game: Game) -> Game {
    game.current_task = Task::Podium(PodiumTask {
        id: Uuid::new_v4(),
        status: TaskStatus::Active,
        created: game.updated,
        entries: Vec::new(),
    });
    game
}

#[tokio::test]
async fn stale_games_are_finalized_once() {
    let store = InMemoryGameStore::new();
    let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let old = now - STALE_AFTER - Duration::from_secs(1);

    let podium = store.create_game(on_podium(game_at("111111", old))).await.unwrap();
    let abandoned = store.create_game(game_at("222222", old)).await.unwrap();
    let fresh = store
        .create_game(game_at("333333", now - Duration::from_secs(60)))
        .await
        .unwrap();

    let report = scheduler::sweep_stale_games(&store, now, STALE_AFTER).await;
    assert_eq!(
        report,
        SweepReport {
            completed: 1,
            expired: 1
        }
    );

    let podium = store.find_game(podium.id).await.unwrap().unwrap();
    assert_eq!(podium.status, GameStatus::Completed);
    assert_eq!(podium.current_task.status(), TaskStatus::Completed);
    let abandoned = store.find_game(abandoned.id).await.unwrap().unwrap();
    assert_eq!(abandoned.status, GameStatus::Expired);
    let fresh = store.find_game(fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, GameStatus::Active);

    let again = scheduler::sweep_stale_games(&store, now, STALE_AFTER).await;
    assert_eq!(again, SweepReport::default());

    // finalized games give their pin back
    assert!(store.create_game(game_at("111111", now)).await.is_ok());
}

#[tokio::test]
async fn only_one_instance_runs_the_sweep() {
    let job = PeriodicJob {
        name: GAME_EXPIRY_JOB,
        interval: Duration::from_secs(300),
        lock_ttl: Duration::from_secs(60),
    };
    let first = Arc::new(InMemoryLock::new());
    let second = InMemoryLock::shared_with(&first);

    assert!(first.try_acquire(job.name, job.lock_ttl).await.unwrap());
    assert!(!scheduler::run_once(&job, &second, || async {}).await);

    first.release(job.name).await.unwrap();
    assert!(scheduler::run_once(&job, &second, || async {}).await);
    assert!(scheduler::run_once(&job, first.as_ref(), || async {}).await);
}
