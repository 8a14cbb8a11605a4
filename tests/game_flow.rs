//! End-to-end gameplay through the service layer with in-memory storage.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::future::{self, BoxFuture};

use live_quiz_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, InMemoryGameStore},
        storage::{StorageError, StorageResult},
    },
    dto::{
        events::EVENT_QUESTION_RESULT,
        game::{CreateGameRequest, JoinGameRequest},
    },
    error::ServiceError,
    services::{game_service, play_service},
    state::{
        AppState, Collaborators, SharedState,
        clock::ManualClock,
        game::{
            AnswerValue, ChoiceOption, Game, GameId, GameMode, GameSettings, GameStatus,
            QuestionKind, QuestionSpec,
        },
        state_machine::{GameEvent, QuitStatus},
        task::{CloseTrigger, Task, TaskType},
    },
};
use serde_json::Value;
use uuid::Uuid;

struct Harness {
    state: SharedState,
    clock: Arc<ManualClock>,
    host: Uuid,
}

/// In-memory store whose next save can be made to fail once.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryGameStore,
    fail_next_save: AtomicBool,
}

impl FlakyStore {
    fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }
}

impl GameStore for FlakyStore {
    fn create_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>> {
        self.inner.create_game(game)
    }

    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        self.inner.find_game(id)
    }

    fn find_active_game_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        self.inner.find_active_game_by_pin(pin)
    }

    fn save_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            let err = StorageError::unavailable("save failed".into(), io::Error::other("down"));
            return Box::pin(future::ready(Err(err)));
        }
        self.inner.save_game(game)
    }

    fn find_stale_podium_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>> {
        self.inner.find_stale_podium_games(before)
    }

    fn find_stale_active_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>> {
        self.inner.find_stale_active_games(before)
    }

    fn update_game_statuses(
        &self,
        ids: Vec<GameId>,
        status: GameStatus,
        before: SystemTime,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.update_game_statuses(ids, status, before, now)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_collaborators(Collaborators::in_memory())
    }

    fn flaky() -> (Self, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        let mut collaborators = Collaborators::in_memory();
        collaborators.store = store.clone();
        (Self::with_collaborators(collaborators), store)
    }

    fn with_collaborators(collaborators: Collaborators) -> Self {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = Arc::new(ManualClock::new(start));
        let collaborators = collaborators.with_clock(clock.clone());
        Self {
            state: AppState::new(collaborators, AppConfig::default()),
            clock,
            host: Uuid::new_v4(),
        }
    }

    async fn create(&self, questions: Vec<QuestionSpec>, settings: GameSettings) -> (GameId, String) {
        let summary = game_service::create_game(
            &self.state,
            self.host,
            CreateGameRequest {
                mode: GameMode::Classic,
                questions,
                settings,
            },
        )
        .await
        .unwrap();
        (summary.id, summary.pin)
    }

    async fn join(&self, pin: &str, nickname: &str) -> Uuid {
        let player = Uuid::new_v4();
        game_service::join_game(
            &self.state,
            player,
            JoinGameRequest {
                pin: pin.to_string(),
                nickname: nickname.to_string(),
            },
        )
        .await
        .unwrap();
        player
    }

    async fn answer(&self, game_id: GameId, player: Uuid, value: bool) -> Result<(), ServiceError> {
        play_service::submit_answer(&self.state, game_id, player, AnswerValue::TrueFalse { value })
            .await
            .map(|_| ())
    }
}

fn true_false(text: &str, correct: bool) -> QuestionSpec {
    QuestionSpec {
        text: text.to_string(),
        duration: 20,
        points: 1000,
        kind: QuestionKind::TrueFalse { correct },
    }
}

fn multi_choice(text: &str, options: &[&str], correct: usize) -> QuestionSpec {
    QuestionSpec {
        text: text.to_string(),
        duration: 20,
        points: 1000,
        kind: QuestionKind::MultiChoice {
            options: options
                .iter()
                .enumerate()
                .map(|(index, value)| ChoiceOption {
                    value: value.to_string(),
                    correct: index == correct,
                })
                .collect(),
        },
    }
}

async fn pick(h: &Harness, game_id: GameId, player: Uuid, option: usize) -> Result<(), ServiceError> {
    play_service::submit_answer(&h.state, game_id, player, AnswerValue::MultiChoice { option })
        .await
        .map(|_| ())
}

#[tokio::test]
async fn two_player_game_reaches_the_podium() {
    let h = Harness::new();
    let (game_id, pin) = h
        .create(
            vec![
                multi_choice("Which keyword declares a trait?", &["impl", "trait", "dyn"], 1),
                multi_choice("Who is the Rust mascot?", &["Ferris", "Gopher", "Duke"], 0),
            ],
            GameSettings::default(),
        )
        .await;
    let ada = h.join(&pin, "ada").await;
    let bob = h.join(&pin, "bob").await;
    let mut ada_events = h.state.events().subscribe(game_id);

    play_service::advance(&h.state, game_id, h.host).await.unwrap();
    h.clock.advance(Duration::from_secs(2));
    pick(&h, game_id, ada, 1).await.unwrap();

    // bob never answers; the next read past the deadline closes the question
    h.clock.advance(Duration::from_secs(19));
    let summary = game_service::game_summary(&h.state, game_id, h.host).await.unwrap();
    assert_eq!(summary.current_task, TaskType::QuestionResult);

    let game = h.state.load_game(game_id).await.unwrap();
    let Task::QuestionResult(result) = &game.current_task else {
        panic!("expected a question result, got {:?}", game.current_task.task_type());
    };
    assert_eq!(result.trigger, CloseTrigger::Deadline);
    assert_eq!(result.results[0].participant_id, ada);
    assert_eq!(result.results[0].last_score, 950);
    assert_eq!(result.results[1].participant_id, bob);
    assert_eq!(result.results[1].last_score, 0);
    assert!(result.results[1].answer.is_none());

    let mut ada_result = None;
    while let Ok(event) = ada_events.try_recv() {
        if event.is_addressed_to(ada, false) && event.event.as_deref() == Some(EVENT_QUESTION_RESULT) {
            ada_result = Some(serde_json::from_str::<Value>(&event.data).unwrap());
        }
    }
    let ada_result = ada_result.expect("question result reaches ada");
    assert_eq!(ada_result["correct"], true);
    assert_eq!(ada_result["rank"]["position"], 1);
    assert!(ada_result.get("results").is_none());

    let snapshot = play_service::advance(&h.state, game_id, h.host).await.unwrap();
    assert_eq!(snapshot.task_type, TaskType::Leaderboard);
    let game = h.state.load_game(game_id).await.unwrap();
    let Task::Leaderboard(board) = &game.current_task else {
        panic!("expected a leaderboard");
    };
    let rows: Vec<(Uuid, u32, u32)> = board
        .entries
        .iter()
        .map(|entry| (entry.participant_id, entry.position, entry.previous_position))
        .collect();
    assert_eq!(rows, vec![(ada, 1, 0), (bob, 2, 0)]);

    play_service::advance(&h.state, game_id, h.host).await.unwrap();
    h.clock.advance(Duration::from_secs(1));
    pick(&h, game_id, bob, 0).await.unwrap();
    pick(&h, game_id, ada, 2).await.unwrap();

    let game = h.state.load_game(game_id).await.unwrap();
    let Task::QuestionResult(result) = &game.current_task else {
        panic!("expected a question result, got {:?}", game.current_task.task_type());
    };
    assert_eq!(result.trigger, CloseTrigger::Quorum);
    let bob_row = &result.results[0];
    assert_eq!(bob_row.participant_id, bob);
    assert_eq!(bob_row.last_score, 975);
    assert_eq!((bob_row.position, bob_row.previous_position), (1, 2));
    let ada_row = &result.results[1];
    assert_eq!(ada_row.participant_id, ada);
    assert_eq!((ada_row.position, ada_row.previous_position), (2, 1));
    assert_eq!(ada_row.streak, 0);

    let snapshot = play_service::advance(&h.state, game_id, h.host).await.unwrap();
    assert_eq!(snapshot.task_type, TaskType::Podium);
    let results = game_service::game_results(&h.state, game_id, ada).await.unwrap();
    assert_eq!(results.standings[0].participant_id, bob);
    assert_eq!(results.standings[0].score, 975);
    assert_eq!(results.standings[1].score, 950);
    assert_eq!(results.standings[1].longest_streak, 1);

    let snapshot = play_service::advance(&h.state, game_id, h.host).await.unwrap();
    assert_eq!(snapshot.status, GameStatus::Completed);
    assert!(matches!(
        pick(&h, game_id, ada, 0).await,
        Err(ServiceError::GameEnded(_))
    ));
    assert!(!h.state.has_pending_timer(game_id));
}

#[tokio::test]
async fn duplicate_answers_are_rejected() {
    let h = Harness::new();
    let (game_id, pin) = h
        .create(vec![true_false("Ferris is a crab", true)], GameSettings::default())
        .await;
    let ada = h.join(&pin, "ada").await;
    h.join(&pin, "bob").await;
    play_service::advance(&h.state, game_id, h.host).await.unwrap();

    h.answer(game_id, ada, true).await.unwrap();
    assert!(matches!(
        h.answer(game_id, ada, false).await,
        Err(ServiceError::AlreadyAnswered)
    ));
    assert!(matches!(
        h.answer(game_id, h.host, true).await,
        Err(ServiceError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn late_joiners_wait_for_the_next_question() {
    let h = Harness::new();
    let (game_id, pin) = h
        .create(
            vec![true_false("Ferris is a crab", true), true_false("Rust is older than C", false)],
            GameSettings::default(),
        )
        .await;
    let ada = h.join(&pin, "ada").await;
    play_service::advance(&h.state, game_id, h.host).await.unwrap();

    let late = h.join(&pin, "late").await;
    assert!(matches!(
        h.answer(game_id, late, true).await,
        Err(ServiceError::AnswerRejected(_))
    ));

    h.answer(game_id, ada, true).await.unwrap();
    let game = h.state.load_game(game_id).await.unwrap();
    let Task::QuestionResult(result) = &game.current_task else {
        panic!("the only eligible answer completes the quorum");
    };
    assert_eq!(result.results.len(), 1);
    assert_eq!(game.player(late).unwrap().unanswered, 0);
}

#[tokio::test]
async fn answers_after_the_deadline_close_the_question() {
    let h = Harness::new();
    let (game_id, pin) = h
        .create(vec![true_false("Ferris is a crab", true)], GameSettings::default())
        .await;
    let ada = h.join(&pin, "ada").await;
    play_service::advance(&h.state, game_id, h.host).await.unwrap();

    h.clock.advance(Duration::from_secs(21));
    assert!(matches!(
        h.answer(game_id, ada, true).await,
        Err(ServiceError::AnswerRejected(_))
    ));

    let game = h.state.load_game(game_id).await.unwrap();
    let Task::QuestionResult(result) = &game.current_task else {
        panic!("expected a question result");
    };
    assert_eq!(result.trigger, CloseTrigger::Deadline);
    assert_eq!(result.results[0].last_score, 0);
    assert_eq!(game.player(ada).unwrap().unanswered, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_closers_produce_a_single_result() {
    let h = Harness::new();
    let (game_id, pin) = h
        .create(vec![true_false("Ferris is a crab", true)], GameSettings::default())
        .await;
    h.join(&pin, "ada").await;
    h.join(&pin, "bob").await;
    play_service::advance(&h.state, game_id, h.host).await.unwrap();
    let task_id = h.state.load_game(game_id).await.unwrap().current_task.id();

    let (first, second) = tokio::join!(
        play_service::close_question(&h.state, game_id, task_id, CloseTrigger::Deadline),
        play_service::close_question(&h.state, game_id, task_id, CloseTrigger::Host),
    );
    first.unwrap();
    second.unwrap();

    let game = h.state.load_game(game_id).await.unwrap();
    assert_eq!(game.current_task.task_type(), TaskType::QuestionResult);
    let kinds: Vec<TaskType> = game.previous_tasks.iter().map(Task::task_type).collect();
    assert_eq!(kinds, vec![TaskType::Lobby, TaskType::Question]);
}

#[tokio::test]
async fn failed_close_keeps_the_question_open() {
    let (h, store) = Harness::flaky();
    let (game_id, pin) = h
        .create(vec![true_false("Ferris is a crab", true)], GameSettings::default())
        .await;
    let ada = h.join(&pin, "ada").await;
    let bob = h.join(&pin, "bob").await;
    play_service::advance(&h.state, game_id, h.host).await.unwrap();
    h.answer(game_id, ada, true).await.unwrap();

    store.fail_next_save();
    assert!(matches!(
        play_service::advance(&h.state, game_id, h.host).await,
        Err(ServiceError::Unavailable(_))
    ));
    let game = h.state.load_game(game_id).await.unwrap();
    assert_eq!(game.current_task.task_type(), TaskType::Question);

    h.answer(game_id, bob, false).await.unwrap();
    let game = h.state.load_game(game_id).await.unwrap();
    let Task::QuestionResult(result) = &game.current_task else {
        panic!("expected a question result, got {:?}", game.current_task.task_type());
    };
    assert_eq!(result.trigger, CloseTrigger::Quorum);
    assert_eq!(result.results.len(), 2);
    assert!(result.results.iter().all(|row| row.answer.is_some()));
}

#[tokio::test]
async fn quorum_answer_is_acknowledged_when_the_close_fails() {
    let (h, store) = Harness::flaky();
    let (game_id, pin) = h
        .create(vec![true_false("Ferris is a crab", true)], GameSettings::default())
        .await;
    let ada = h.join(&pin, "ada").await;
    play_service::advance(&h.state, game_id, h.host).await.unwrap();

    store.fail_next_save();
    let ack = play_service::submit_answer(&h.state, game_id, ada, AnswerValue::TrueFalse { value: true })
        .await
        .unwrap();
    assert!(ack.accepted);
    assert_eq!((ack.current, ack.total), (1, 1));
    let game = h.state.load_game(game_id).await.unwrap();
    assert_eq!(game.current_task.task_type(), TaskType::Question);

    // the recorded answer survives until the deadline closes the question
    h.clock.advance(Duration::from_secs(21));
    let summary = game_service::game_summary(&h.state, game_id, h.host).await.unwrap();
    assert_eq!(summary.current_task, TaskType::QuestionResult);
    let game = h.state.load_game(game_id).await.unwrap();
    let Task::QuestionResult(result) = &game.current_task else {
        panic!("expected a question result");
    };
    assert_eq!(result.trigger, CloseTrigger::Deadline);
    assert!(result.results[0].last_score > 0);
}

#[tokio::test]
async fn quitting_from_the_lobby_expires_the_game() {
    let h = Harness::new();
    let (game_id, pin) = h
        .create(vec![true_false("Ferris is a crab", true)], GameSettings::default())
        .await;
    let ada = h.join(&pin, "ada").await;

    assert!(matches!(
        play_service::quit(&h.state, game_id, ada, QuitStatus::Expired).await,
        Err(ServiceError::Unauthorized(_))
    ));
    let snapshot = play_service::quit(&h.state, game_id, h.host, QuitStatus::Expired)
        .await
        .unwrap();
    assert_eq!(snapshot.status, GameStatus::Expired);
    assert_eq!(snapshot.task_type, TaskType::Quit);

    assert!(matches!(
        play_service::advance(&h.state, game_id, h.host).await,
        Err(ServiceError::GameEnded(_))
    ));
    assert!(matches!(
        h.answer(game_id, ada, true).await,
        Err(ServiceError::GameEnded(_))
    ));
    let rejoin = game_service::join_game(
        &h.state,
        Uuid::new_v4(),
        JoinGameRequest {
            pin,
            nickname: "bob".into(),
        },
    )
    .await;
    assert!(matches!(rejoin, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn auto_completed_game_without_players_runs_to_the_end() {
    let h = Harness::new();
    let settings = GameSettings {
        auto_complete_question_result: true,
        auto_complete_leaderboard: true,
        auto_complete_podium: true,
    };
    let (game_id, _) = h
        .create(
            vec![true_false("Ferris is a crab", true), true_false("Rust is older than C", false)],
            settings,
        )
        .await;
    let lobby = h.state.load_game(game_id).await.unwrap().current_task.id();

    let snapshot = play_service::advance(&h.state, game_id, h.host).await.unwrap();
    assert_eq!(snapshot.status, GameStatus::Completed);

    let game = h.state.load_game(game_id).await.unwrap();
    let kinds: Vec<TaskType> = game.previous_tasks.iter().map(Task::task_type).collect();
    assert_eq!(
        kinds,
        vec![
            TaskType::Lobby,
            TaskType::Question,
            TaskType::QuestionResult,
            TaskType::Leaderboard,
            TaskType::Question,
            TaskType::QuestionResult,
        ]
    );
    assert_eq!(game.current_task.task_type(), TaskType::Podium);
    assert!(!h.state.has_pending_timer(game_id));

    let replay = h
        .state
        .run_transition(game_id, GameEvent::Advance { from_task: lobby })
        .await;
    assert!(matches!(replay, Err(ServiceError::GameEnded(_))));
}
