//! Task state machine driving a [`Game`] from its lobby to the podium.
//!
//! Transitions are pure: they mutate the aggregate in memory and return a
//! [`Transition`] describing what happened. Persistence, timers and fan-out
//! are left to the caller.

use std::{mem, time::SystemTime};

use rand::seq::SliceRandom;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    scoring::{self, ScoringConfig, ScoringError},
    state::{
        game::{CollectedAnswer, Game, GameStatus, ParticipantId, QuestionKind, TaskId},
        leaderboard::{self, GradedAnswer, LeaderboardConfig},
        task::{
            CloseTrigger, LeaderboardTask, PodiumTask, QuestionResultEntry, QuestionResultTask,
            QuestionTask, QuitTask, Task, TaskStatus, TaskType,
        },
    },
};

/// Terminal status requested by the caller of a quit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitStatus {
    /// The game produced a meaningful result.
    Completed,
    /// The game was abandoned.
    Expired,
}

impl From<QuitStatus> for GameStatus {
    fn from(status: QuitStatus) -> Self {
        match status {
            QuitStatus::Completed => GameStatus::Completed,
            QuitStatus::Expired => GameStatus::Expired,
        }
    }
}

/// Events that can be applied to a game.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Leave the current pause task (lobby, result, leaderboard or podium).
    Advance {
        /// Task the caller observed as current.
        from_task: TaskId,
    },
    /// Close an open question and grade every eligible player.
    CloseQuestion {
        /// Question task to close.
        task_id: TaskId,
        /// What closed it.
        trigger: CloseTrigger,
        /// Sealed answers collected while the question was open.
        answers: Vec<CollectedAnswer>,
    },
    /// Host-initiated early termination.
    Quit {
        /// Terminal status to record.
        status: QuitStatus,
    },
}

/// Errors raised when an event cannot be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    /// The event does not apply to the current task.
    #[error("illegal task type: current task is {actual:?}, expected one of {expected:?}")]
    IllegalTaskType {
        /// Current task type.
        actual: TaskType,
        /// Task types the event applies to.
        expected: Vec<TaskType>,
    },
    /// No question exists at the requested index.
    #[error("question index {index} is out of range ({len} questions)")]
    QuestionOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of questions.
        len: usize,
    },
    /// The game is already terminal.
    #[error("game has ended ({})", .status.as_str())]
    GameEnded {
        /// Terminal status.
        status: GameStatus,
    },
    /// The event targets a task that is neither current nor superseded.
    #[error("task {requested} is not the current task {current}")]
    TaskMismatch {
        /// Current task.
        current: TaskId,
        /// Task the event targeted.
        requested: TaskId,
    },
    /// The question cannot be graded in this game.
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Inputs a transition needs besides the game itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// Instant stamped on entered tasks.
    pub now: SystemTime,
    /// Grading constants.
    pub scoring: &'a ScoringConfig,
    /// Ranking settings.
    pub leaderboard: &'a LeaderboardConfig,
}

/// Description of an applied transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Task type left.
    pub from: TaskType,
    /// Task type entered.
    pub to: TaskType,
    /// Current task after the transition.
    pub task: Task,
    /// Game status after the transition.
    pub game_status: GameStatus,
}

impl Transition {
    /// Whether this transition moved the game into a terminal status.
    pub fn ended_game(&self) -> bool {
        self.game_status.is_terminal()
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The game changed.
    Applied(Transition),
    /// The event targeted a task that was already superseded; nothing changed.
    AlreadyApplied,
}

/// Apply `event` to `game`.
///
/// Events naming a task that already sits in the history are treated as
/// replays and leave the game untouched.
pub fn apply(
    game: &mut Game,
    event: GameEvent,
    ctx: &TransitionContext<'_>,
) -> Result<TransitionOutcome, TransitionError> {
    if game.status.is_terminal() {
        return Err(TransitionError::GameEnded {
            status: game.status,
        });
    }
    if matches!(game.current_task, Task::Quit(_)) {
        return Err(TransitionError::GameEnded {
            status: game.status,
        });
    }

    if let Some(target) = targeted_task(&event) {
        if game.has_previous_task(target) {
            return Ok(TransitionOutcome::AlreadyApplied);
        }
        let current = game.current_task.id();
        if target != current {
            return Err(TransitionError::TaskMismatch {
                current,
                requested: target,
            });
        }
    }

    let from = game.current_task.task_type();
    match event {
        GameEvent::Advance { .. } => advance(game, ctx),
        GameEvent::CloseQuestion {
            trigger, answers, ..
        } => close_question(game, trigger, answers, ctx),
        GameEvent::Quit { status } => {
            let status = if from == TaskType::Podium {
                GameStatus::Completed
            } else {
                status.into()
            };
            game.status = status;
            replace_current(
                game,
                Task::Quit(QuitTask {
                    id: Uuid::new_v4(),
                    status: TaskStatus::Completed,
                    created: ctx.now,
                }),
                ctx.now,
            );
            Ok(applied(game, from))
        }
    }
}

/// Advance event the game's settings allow to synthesize right away, if any.
pub fn auto_advance(game: &Game) -> Option<GameEvent> {
    if game.status.is_terminal() {
        return None;
    }
    let settings = &game.settings;
    let enabled = match game.current_task.task_type() {
        TaskType::QuestionResult => settings.auto_complete_question_result,
        TaskType::Leaderboard => settings.auto_complete_leaderboard,
        TaskType::Podium => settings.auto_complete_podium,
        TaskType::Lobby | TaskType::Question | TaskType::Quit => false,
    };
    enabled.then(|| GameEvent::Advance {
        from_task: game.current_task.id(),
    })
}

fn targeted_task(event: &GameEvent) -> Option<TaskId> {
    match event {
        GameEvent::Advance { from_task } => Some(*from_task),
        GameEvent::CloseQuestion { task_id, .. } => Some(*task_id),
        GameEvent::Quit { .. } => None,
    }
}

fn advance(
    game: &mut Game,
    ctx: &TransitionContext<'_>,
) -> Result<TransitionOutcome, TransitionError> {
    let from = game.current_task.task_type();
    let remaining = game.next_question < game.questions.len();

    let next = match from {
        TaskType::Lobby => enter_question(game, ctx)?,
        TaskType::QuestionResult if remaining => Task::Leaderboard(LeaderboardTask {
            id: Uuid::new_v4(),
            status: TaskStatus::Active,
            created: ctx.now,
            question_index: game.next_question.saturating_sub(1),
            entries: leaderboard::preview(&game.participants, ctx.leaderboard.preview_size),
        }),
        TaskType::Leaderboard if remaining => enter_question(game, ctx)?,
        TaskType::QuestionResult | TaskType::Leaderboard => enter_podium(game, ctx),
        TaskType::Podium => {
            game.status = GameStatus::Completed;
            game.current_task.set_status(TaskStatus::Completed);
            game.updated = ctx.now;
            return Ok(applied(game, from));
        }
        TaskType::Question | TaskType::Quit => {
            return Err(TransitionError::IllegalTaskType {
                actual: from,
                expected: vec![
                    TaskType::Lobby,
                    TaskType::QuestionResult,
                    TaskType::Leaderboard,
                    TaskType::Podium,
                ],
            });
        }
    };

    replace_current(game, next, ctx.now);
    Ok(applied(game, from))
}

fn enter_question(game: &mut Game, ctx: &TransitionContext<'_>) -> Result<Task, TransitionError> {
    let index = game.next_question;
    let question = game
        .questions
        .get(index)
        .ok_or(TransitionError::QuestionOutOfRange {
            index,
            len: game.questions.len(),
        })?;
    scoring::ensure_supported(game.mode, question.question_type())?;
    let prompt_order = match &question.kind {
        QuestionKind::Puzzle { values } => scrambled(values),
        _ => Vec::new(),
    };

    game.next_question += 1;
    Ok(Task::Question(QuestionTask {
        id: Uuid::new_v4(),
        status: TaskStatus::Active,
        created: ctx.now,
        question_index: index,
        presented: ctx.now,
        eligible_players: game.players().map(|player| player.id).collect(),
        answers: Vec::new(),
        closed_by: None,
        prompt_order,
    }))
}

/// Random order of puzzle items that differs from the target whenever the
/// items are distinct.
fn scrambled(target: &[String]) -> Vec<String> {
    let mut order = target.to_vec();
    order.shuffle(&mut rand::rng());
    if order == target && order.len() > 1 {
        order.rotate_left(1);
    }
    order
}

fn enter_podium(game: &Game, ctx: &TransitionContext<'_>) -> Task {
    Task::Podium(PodiumTask {
        id: Uuid::new_v4(),
        status: TaskStatus::Active,
        created: ctx.now,
        entries: leaderboard::preview(&game.participants, ctx.leaderboard.preview_size),
    })
}

fn close_question(
    game: &mut Game,
    trigger: CloseTrigger,
    answers: Vec<CollectedAnswer>,
    ctx: &TransitionContext<'_>,
) -> Result<TransitionOutcome, TransitionError> {
    let from = game.current_task.task_type();
    let Some((task, question)) = game.current_question() else {
        return Err(match &game.current_task {
            Task::Question(task) => TransitionError::QuestionOutOfRange {
                index: task.question_index,
                len: game.questions.len(),
            },
            _ => TransitionError::IllegalTaskType {
                actual: from,
                expected: vec![TaskType::Question],
            },
        });
    };

    let eligible: Vec<ParticipantId> = task.eligible_players.clone();
    let answers: Vec<CollectedAnswer> = answers
        .into_iter()
        .filter(|collected| eligible.contains(&collected.participant_id))
        .collect();

    let mut graded = Vec::with_capacity(eligible.len());
    for participant_id in &eligible {
        let answer = answers
            .iter()
            .find(|collected| collected.participant_id == *participant_id)
            .map(|collected| &collected.answer);
        let grade = scoring::grade(game.mode, question, task.presented, answer, ctx.scoring)?;
        graded.push(GradedAnswer {
            participant_id: *participant_id,
            grade,
        });
    }
    let question_index = task.question_index;
    let question_task_id = task.id;

    leaderboard::apply_grades(&mut game.participants, &graded, ctx.now);
    leaderboard::rerank(&mut game.participants, ctx.leaderboard.tie_break);

    let mut results: Vec<QuestionResultEntry> = graded
        .iter()
        .filter_map(|graded| {
            let player = game.player(graded.participant_id)?;
            let answer = answers
                .iter()
                .find(|collected| collected.participant_id == graded.participant_id)
                .map(|collected| collected.answer.clone());
            Some(QuestionResultEntry {
                participant_id: player.id,
                nickname: player.nickname.clone(),
                answer,
                correct: graded.grade.correct,
                last_score: graded.grade.score,
                total_score: player.score,
                position: player.rank,
                previous_position: player.previous_rank,
                streak: player.streaks.current,
                response_time_ms: graded
                    .grade
                    .response_time
                    .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
            })
        })
        .collect();
    results.sort_by_key(|entry| entry.position);

    if let Task::Question(task) = &mut game.current_task {
        task.answers = answers;
        task.closed_by = Some(trigger);
    }

    replace_current(
        game,
        Task::QuestionResult(QuestionResultTask {
            id: Uuid::new_v4(),
            status: TaskStatus::Active,
            created: ctx.now,
            question_index,
            question_task_id,
            trigger,
            results,
        }),
        ctx.now,
    );
    Ok(applied(game, from))
}

fn replace_current(game: &mut Game, next: Task, now: SystemTime) {
    let mut previous = mem::replace(&mut game.current_task, next);
    previous.set_status(TaskStatus::Completed);
    game.previous_tasks.push(previous);
    game.updated = now;
}

fn applied(game: &Game, from: TaskType) -> TransitionOutcome {
    TransitionOutcome::Applied(Transition {
        from,
        to: game.current_task.task_type(),
        task: game.current_task.clone(),
        game_status: game.status,
    })
}
