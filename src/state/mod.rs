pub mod clock;
/// Per-game broadcast channels.
pub mod events;
/// Game aggregate, participants and questions.
pub mod game;
pub mod leaderboard;
pub mod state_machine;
pub mod task;

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use tokio::{task::AbortHandle, time::timeout};
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, InMemoryGameStore},
        lock::{DistributedLock, InMemoryLock},
        storage::StorageError,
        submissions::{InMemorySubmissionTracker, SubmissionTracker},
    },
    error::ServiceError,
    state::{
        clock::{Clock, SystemClock},
        events::EventHub,
        game::{Game, GameId, TaskId},
        state_machine::{GameEvent, Transition, TransitionContext, TransitionOutcome},
        task::Task,
    },
};

/// Handle on the application state cloned into handlers and jobs.
pub type SharedState = Arc<AppState>;

/// Events buffered per game before slow subscribers start lagging.
const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Load/apply/save attempts of one transition; a second conflict is surfaced.
const TRANSITION_ATTEMPTS: usize = 2;

/// Storage and infrastructure handles the application is wired with.
pub struct Collaborators {
    /// Game persistence.
    pub store: Arc<dyn GameStore>,
    /// Answer ledgers of open questions.
    pub tracker: Arc<dyn SubmissionTracker>,
    /// Leases for background jobs.
    pub lock: Arc<dyn DistributedLock>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Process-local collaborators backed by the system clock.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryGameStore::new()),
            tracker: Arc::new(InMemorySubmissionTracker::new()),
            lock: Arc::new(InMemoryLock::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock, keeping every other collaborator.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Pending deadline of the open question of a game.
struct QuestionTimer {
    task_id: TaskId,
    handle: AbortHandle,
}

/// A transition that was applied and persisted.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    /// Game as saved, version included.
    pub game: Game,
    /// What changed.
    pub transition: Transition,
}

/// Central application state shared by every request handler and background job.
pub struct AppState {
    store: Arc<dyn GameStore>,
    tracker: Arc<dyn SubmissionTracker>,
    lock: Arc<dyn DistributedLock>,
    clock: Arc<dyn Clock>,
    events: EventHub,
    timers: DashMap<GameId, QuestionTimer>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(collaborators: Collaborators, config: AppConfig) -> SharedState {
        let Collaborators {
            store,
            tracker,
            lock,
            clock,
        } = collaborators;
        Arc::new(Self {
            store,
            tracker,
            lock,
            clock,
            events: EventHub::new(EVENT_CHANNEL_CAPACITY),
            timers: DashMap::new(),
            config,
        })
    }

    /// State wired with process-local collaborators.
    pub fn in_memory(config: AppConfig) -> SharedState {
        Self::new(Collaborators::in_memory(), config)
    }

    /// Game persistence.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Answer ledgers of open questions.
    pub fn tracker(&self) -> &Arc<dyn SubmissionTracker> {
        &self.tracker
    }

    /// Leases for background jobs.
    pub fn lock(&self) -> &Arc<dyn DistributedLock> {
        &self.lock
    }

    /// Per-game broadcast hubs feeding the SSE streams.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current instant according to the configured clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Load a game or fail with `NotFound`.
    pub async fn load_game(&self, game_id: GameId) -> Result<Game, ServiceError> {
        self.store
            .find_game(game_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("game {game_id}")))
    }

    /// Apply `event` to the stored game and persist the result.
    ///
    /// The game is reloaded and the event reapplied once when another writer
    /// saved in between. Returns `None` when the event was a replay of an
    /// already superseded task.
    pub async fn run_transition(
        &self,
        game_id: GameId,
        event: GameEvent,
    ) -> Result<Option<AppliedTransition>, ServiceError> {
        let limit = self.config.gameplay.transition_timeout;
        match timeout(limit, self.transition_with_retry(game_id, event.clone())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%game_id, event = ?event, "transition timed out");
                Err(ServiceError::Timeout)
            }
        }
    }

    async fn transition_with_retry(
        &self,
        game_id: GameId,
        event: GameEvent,
    ) -> Result<Option<AppliedTransition>, ServiceError> {
        let mut last_conflict = None;
        for attempt in 1..=TRANSITION_ATTEMPTS {
            let mut game = self.load_game(game_id).await?;
            let ctx = TransitionContext {
                now: self.now(),
                scoring: &self.config.scoring,
                leaderboard: &self.config.leaderboard,
            };
            let transition = match state_machine::apply(&mut game, event.clone(), &ctx)? {
                TransitionOutcome::Applied(transition) => transition,
                TransitionOutcome::AlreadyApplied => {
                    debug!(%game_id, attempt, "transition already applied");
                    return Ok(None);
                }
            };

            let opened = self.open_question_ledger(&game).await?;
            match self.store.save_game(game).await {
                Ok(game) => return Ok(Some(AppliedTransition { game, transition })),
                Err(err) => {
                    if let Some(task_id) = opened {
                        if let Err(discard_err) = self.tracker.discard(game_id, task_id).await {
                            warn!(%game_id, %task_id, error = %discard_err, "failed to discard orphan ledger");
                        }
                    }
                    if !err.is_conflict() {
                        return Err(err.into());
                    }
                    debug!(%game_id, attempt, error = %err, "transition lost a write race; reloading");
                    last_conflict = Some(err);
                }
            }
        }

        Err(last_conflict
            .map(ServiceError::from)
            .unwrap_or_else(|| ServiceError::Conflict(format!("game {game_id}"))))
    }

    /// Open the submission ledger of a freshly entered question before it becomes visible.
    async fn open_question_ledger(&self, game: &Game) -> Result<Option<TaskId>, StorageError> {
        let Task::Question(task) = &game.current_task else {
            return Ok(None);
        };
        self.tracker
            .open(game.id, task.id, task.eligible_players.clone())
            .await?;
        Ok(Some(task.id))
    }

    /// Track the deadline timer of `task_id`, aborting any timer it replaces.
    pub(crate) fn install_timer(&self, game_id: GameId, task_id: TaskId, handle: AbortHandle) {
        if let Some(previous) = self
            .timers
            .insert(game_id, QuestionTimer { task_id, handle })
        {
            if previous.task_id != task_id {
                previous.handle.abort();
            }
        }
    }

    /// Remove the timer entry of `task_id` without aborting it.
    ///
    /// Called by the timer itself before it closes the question; returns
    /// `false` when the timer was cancelled or replaced meanwhile.
    pub(crate) fn release_timer(&self, game_id: GameId, task_id: TaskId) -> bool {
        self.timers
            .remove_if(&game_id, |_, timer| timer.task_id == task_id)
            .is_some()
    }

    /// Abort the timer of `task_id`, if it is still pending.
    pub(crate) fn cancel_timer_for(&self, game_id: GameId, task_id: TaskId) {
        if let Some((_, timer)) = self
            .timers
            .remove_if(&game_id, |_, timer| timer.task_id == task_id)
        {
            timer.handle.abort();
        }
    }

    /// Abort whatever timer the game has pending.
    pub(crate) fn cancel_timers(&self, game_id: GameId) {
        if let Some((_, timer)) = self.timers.remove(&game_id) {
            timer.handle.abort();
        }
    }

    /// Whether a deadline timer is pending for `game_id`.
    pub fn has_pending_timer(&self, game_id: GameId) -> bool {
        self.timers.contains_key(&game_id)
    }
}
