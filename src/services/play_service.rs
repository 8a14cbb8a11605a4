//! Gameplay commands: answers, host advances, question closing and quitting.
//!
//! Every command loads the game, applies one event through the task state
//! machine and persists it under an optimistic version check. Side effects
//! (fan-out, deadline timers, ledger cleanup, auto-completion) run once the
//! transition is saved.

use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::{
    dao::submissions::RecordOutcome,
    dto::game::{SubmissionAck, TaskSnapshot},
    error::ServiceError,
    scoring,
    services::dispatch,
    state::{
        AppliedTransition, SharedState,
        game::{AnswerValue, Game, GameId, ParticipantId, SubmittedAnswer, TaskId},
        state_machine::{self, GameEvent, QuitStatus},
        task::{CloseTrigger, Task, TaskType},
    },
};

/// Record `answer` from `participant_id` for the open question.
///
/// Closes the question when the answer completes the quorum, or when the
/// deadline already passed (in which case the answer is rejected).
pub async fn submit_answer(
    state: &SharedState,
    game_id: GameId,
    participant_id: ParticipantId,
    answer: AnswerValue,
) -> Result<SubmissionAck, ServiceError> {
    let now = state.now();
    let game = state.load_game(game_id).await?;
    ensure_playing(&game)?;
    if game.is_host(participant_id) {
        return Err(ServiceError::Unauthorized("the host cannot answer".into()));
    }
    if game.player(participant_id).is_none() {
        return Err(ServiceError::Unauthorized(format!(
            "participant {participant_id} is not a player of game {game_id}"
        )));
    }

    let Some((task, question)) = game.current_question() else {
        return Err(ServiceError::AnswerRejected("no question is open".into()));
    };
    let task_id = task.id;
    if game.question_deadline_passed(now) {
        close_question(state, game_id, task_id, CloseTrigger::Deadline).await?;
        return Err(ServiceError::AnswerRejected(
            "the question deadline has passed".into(),
        ));
    }
    if !task.eligible_players.contains(&participant_id) {
        return Err(ServiceError::AnswerRejected(
            "joined after the question was presented".into(),
        ));
    }
    scoring::validate_answer(question, &answer)?;

    let submitted = SubmittedAnswer {
        value: answer,
        created: now,
    };
    let counts = match state
        .tracker()
        .record(game_id, task_id, participant_id, submitted)
        .await?
    {
        RecordOutcome::Accepted(counts) => counts,
        RecordOutcome::Duplicate => return Err(ServiceError::AlreadyAnswered),
        RecordOutcome::NotEligible => {
            return Err(ServiceError::AnswerRejected(
                "not eligible for this question".into(),
            ));
        }
        RecordOutcome::Closed => {
            return Err(ServiceError::AnswerRejected("the question is closed".into()));
        }
    };
    debug!(%game_id, %task_id, %participant_id, current = counts.current, total = counts.total, "answer accepted");

    dispatch::publish_submissions(state, game_id, task_id, counts);
    if counts.quorum_reached() {
        // the answer is recorded; the deadline closes the question if this fails
        if let Err(err) = close_question(state, game_id, task_id, CloseTrigger::Quorum).await {
            warn!(%game_id, %task_id, error = %err, "failed to close question on quorum");
        }
    }
    Ok(counts.into())
}

/// Host command leaving the current task.
///
/// During a question this closes it right away; on a pause task it moves to
/// the next one.
pub async fn advance(
    state: &SharedState,
    game_id: GameId,
    participant_id: ParticipantId,
) -> Result<TaskSnapshot, ServiceError> {
    let game = state.load_game(game_id).await?;
    ensure_host(&game, participant_id)?;
    ensure_playing(&game)?;

    let current = game.current_task.id();
    if let Task::Question(_) = game.current_task {
        close_question(state, game_id, current, CloseTrigger::Host).await?;
    } else {
        let applied = state
            .run_transition(game_id, GameEvent::Advance { from_task: current })
            .await?;
        if let Some(applied) = applied {
            info!(%game_id, from = ?applied.transition.from, to = ?applied.transition.to, "host advanced game");
            settle(state, applied).await?;
        }
    }

    let game = state.load_game(game_id).await?;
    Ok(TaskSnapshot::from(&game))
}

/// Seal the answers of `task_id` and move the game to its question result.
///
/// Racing closers are harmless: the loser observes a replay and does nothing.
/// When the transition cannot be saved the ledger is unsealed again, so the
/// question keeps accepting answers.
pub async fn close_question(
    state: &SharedState,
    game_id: GameId,
    task_id: TaskId,
    trigger: CloseTrigger,
) -> Result<(), ServiceError> {
    let answers = state.tracker().seal(game_id, task_id).await?;
    let event = GameEvent::CloseQuestion {
        task_id,
        trigger,
        answers,
    };
    match state.run_transition(game_id, event).await {
        Ok(Some(applied)) => {
            info!(%game_id, %task_id, ?trigger, "question closed");
            settle(state, applied).await
        }
        Ok(None) => {
            debug!(%game_id, %task_id, ?trigger, "question already closed");
            Ok(())
        }
        Err(ServiceError::GameEnded(status)) => {
            debug!(%game_id, %task_id, %status, "game ended before the question closed");
            Ok(())
        }
        Err(err) => {
            if let Err(unseal_err) = state.tracker().unseal(game_id, task_id).await {
                warn!(%game_id, %task_id, error = %unseal_err, "failed to unseal answer ledger");
            }
            Err(err)
        }
    }
}

/// Host-initiated termination; cancels every pending timer of the game.
pub async fn quit(
    state: &SharedState,
    game_id: GameId,
    participant_id: ParticipantId,
    status: QuitStatus,
) -> Result<TaskSnapshot, ServiceError> {
    let game = state.load_game(game_id).await?;
    ensure_host(&game, participant_id)?;

    let applied = state
        .run_transition(game_id, GameEvent::Quit { status })
        .await?
        .ok_or_else(|| ServiceError::InvalidState("quit was reported as a replay".into()))?;
    info!(%game_id, status = applied.game.status.as_str(), "host quit game");
    let snapshot = TaskSnapshot::from(&applied.game);
    settle(state, applied).await?;
    Ok(snapshot)
}

/// Close the open question if its deadline passed without a timer firing.
///
/// Returns the game as it stands afterwards.
pub async fn enforce_deadline(state: &SharedState, game: Game) -> Result<Game, ServiceError> {
    let task_id = match game.current_question() {
        Some((task, _)) if game.question_deadline_passed(state.now()) => task.id,
        _ => return Ok(game),
    };
    let game_id = game.id;
    close_question(state, game_id, task_id, CloseTrigger::Deadline).await?;
    state.load_game(game_id).await
}

fn ensure_host(game: &Game, participant_id: ParticipantId) -> Result<(), ServiceError> {
    if game.is_host(participant_id) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "only the host can drive the game".into(),
        ))
    }
}

fn ensure_playing(game: &Game) -> Result<(), ServiceError> {
    if game.status.is_terminal() || game.current_task.task_type() == TaskType::Quit {
        return Err(ServiceError::GameEnded(game.status.as_str().into()));
    }
    Ok(())
}

/// Run the side effects of `applied`, then keep applying whatever the game
/// can do on its own (empty questions, auto-completed pauses).
async fn settle(state: &SharedState, mut applied: AppliedTransition) -> Result<(), ServiceError> {
    loop {
        after_transition(state, &applied).await;

        let Some(event) = follow_up(state, &applied.game).await? else {
            return Ok(());
        };
        match state.run_transition(applied.game.id, event).await {
            Ok(Some(next)) => applied = next,
            Ok(None) | Err(ServiceError::GameEnded(_)) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

async fn follow_up(state: &SharedState, game: &Game) -> Result<Option<GameEvent>, ServiceError> {
    if let Task::Question(task) = &game.current_task {
        if task.eligible_players.is_empty() {
            let answers = state.tracker().seal(game.id, task.id).await?;
            return Ok(Some(GameEvent::CloseQuestion {
                task_id: task.id,
                trigger: CloseTrigger::Quorum,
                answers,
            }));
        }
        return Ok(None);
    }
    Ok(state_machine::auto_advance(game))
}

async fn after_transition(state: &SharedState, applied: &AppliedTransition) {
    let AppliedTransition { game, transition } = applied;
    dispatch::publish_transition(state, game, transition);

    if transition.from == TaskType::Question {
        if let Some(question_task) = game.previous_tasks.last() {
            let task_id = question_task.id();
            state.cancel_timer_for(game.id, task_id);
            if let Err(err) = state.tracker().discard(game.id, task_id).await {
                warn!(game_id = %game.id, %task_id, error = %err, "failed to discard answer ledger");
            }
        }
    }

    if transition.ended_game() {
        state.cancel_timers(game.id);
        state.events().close(game.id);
        return;
    }

    if let Task::Question(task) = &transition.task {
        if let Some((_, question)) = game.current_question() {
            let deadline = task.presented + question.duration() + state.config().gameplay.deadline_grace;
            schedule_deadline(state, game.id, task.id, deadline);
        }
    }
}

fn schedule_deadline(state: &SharedState, game_id: GameId, task_id: TaskId, deadline: SystemTime) {
    let handle = tokio::spawn(deadline_timer(state.clone(), game_id, task_id, deadline));
    state.install_timer(game_id, task_id, handle.abort_handle());
}

fn deadline_timer(
    state: SharedState,
    game_id: GameId,
    task_id: TaskId,
    deadline: SystemTime,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let wait = deadline
            .duration_since(state.now())
            .unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        if !state.release_timer(game_id, task_id) {
            return;
        }
        debug!(%game_id, %task_id, "question deadline reached");
        if let Err(err) = close_question(&state, game_id, task_id, CloseTrigger::Deadline).await {
            warn!(%game_id, %task_id, error = %err, "failed to close question at its deadline");
        }
    })
}
