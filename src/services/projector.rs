//! Event Projector: renders an applied transition into host and player views.
//!
//! Both views derive from the persisted game and the transition alone, so
//! what a client sees never diverges from what was saved.

use crate::{
    dao::submissions::SubmissionCounts,
    dto::{
        events::{
            HostEvent, HostResultRow, PlayerEvent, PlayerJoinedEvent, QuestionEvent,
            QuestionPrompt, QuestionStats, RankContext, SubmissionsUpdatedEvent,
        },
        format_system_time,
    },
    state::{
        game::{Game, ParticipantId, Player, QuestionKind, TaskId},
        state_machine::Transition,
        task::{QuestionResultEntry, QuestionResultTask, QuestionTask, Task},
    },
};

/// Events to fan out after one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Event for the host.
    pub host: HostEvent,
    /// One event per player.
    pub players: Vec<(ParticipantId, PlayerEvent)>,
}

/// Render `transition`, already applied to `game`, for every participant.
///
/// Returns `None` for a transition nothing is shown for.
pub fn project(game: &Game, transition: &Transition) -> Option<Projection> {
    if transition.ended_game() {
        let status = game.status;
        let quit = matches!(transition.task, Task::Quit(_));
        let host = if quit {
            HostEvent::Quit { status }
        } else {
            HostEvent::GameEnded { status }
        };
        let players = game
            .players()
            .map(|player| {
                let event = if quit {
                    PlayerEvent::Quit { status }
                } else {
                    PlayerEvent::GameEnded { status }
                };
                (player.id, event)
            })
            .collect();
        return Some(Projection { host, players });
    }

    let projection = match &transition.task {
        Task::Question(task) => {
            let event = question_event(game, task)?;
            Projection {
                host: HostEvent::Question(event.clone()),
                players: game
                    .players()
                    .map(|player| (player.id, PlayerEvent::Question(event.clone())))
                    .collect(),
            }
        }
        Task::QuestionResult(task) => question_result(game, task)?,
        Task::Leaderboard(task) => Projection {
            host: HostEvent::Leaderboard {
                task_id: task.id,
                question_index: task.question_index,
                entries: task.entries.clone(),
            },
            players: game
                .players()
                .map(|player| {
                    (
                        player.id,
                        PlayerEvent::Leaderboard {
                            task_id: task.id,
                            question_index: task.question_index,
                            entries: task.entries.clone(),
                            rank: rank_context(game, player),
                        },
                    )
                })
                .collect(),
        },
        Task::Podium(task) => Projection {
            host: HostEvent::Podium {
                task_id: task.id,
                entries: task.entries.clone(),
            },
            players: game
                .players()
                .map(|player| {
                    (
                        player.id,
                        PlayerEvent::Podium {
                            task_id: task.id,
                            entries: task.entries.clone(),
                            rank: rank_context(game, player),
                        },
                    )
                })
                .collect(),
        },
        Task::Lobby(_) | Task::Quit(_) => return None,
    };
    Some(projection)
}

/// Host notification after an answer was accepted.
pub fn project_submissions(task_id: TaskId, counts: SubmissionCounts) -> SubmissionsUpdatedEvent {
    SubmissionsUpdatedEvent {
        task_id,
        current: counts.current,
        total: counts.total,
    }
}

/// Room notification after `player` joined `game`.
pub fn project_player_joined(game: &Game, player: &Player) -> PlayerJoinedEvent {
    PlayerJoinedEvent {
        participant_id: player.id,
        nickname: player.nickname.clone(),
        player_count: u32::try_from(game.player_count()).unwrap_or(u32::MAX),
    }
}

fn question_event(game: &Game, task: &QuestionTask) -> Option<QuestionEvent> {
    let question = game.questions.get(task.question_index)?;
    Some(QuestionEvent {
        task_id: task.id,
        question_index: task.question_index,
        question_count: game.questions.len(),
        text: question.text.clone(),
        question_type: question.question_type(),
        duration: question.duration,
        points: question.points,
        prompt: prompt(&question.kind, task),
        presented_at: format_system_time(task.presented),
        eligible_players: u32::try_from(task.eligible_players.len()).unwrap_or(u32::MAX),
    })
}

/// Strip the answer key from a question presented as `task`.
pub fn prompt(kind: &QuestionKind, task: &QuestionTask) -> QuestionPrompt {
    match kind {
        QuestionKind::MultiChoice { options } => QuestionPrompt::MultiChoice {
            options: options.iter().map(|option| option.value.clone()).collect(),
        },
        QuestionKind::TrueFalse { .. } => QuestionPrompt::TrueFalse,
        QuestionKind::TypeAnswer { .. } => QuestionPrompt::TypeAnswer,
        QuestionKind::Range { min, max, .. } => QuestionPrompt::Range {
            min: *min,
            max: *max,
        },
        QuestionKind::Pin { .. } => QuestionPrompt::Pin,
        QuestionKind::Puzzle { .. } => QuestionPrompt::Puzzle {
            values: task.prompt_order.clone(),
        },
        QuestionKind::ZeroToOneHundredRange { .. } => QuestionPrompt::ZeroToOneHundredRange,
    }
}

fn question_result(game: &Game, task: &QuestionResultTask) -> Option<Projection> {
    let correct_answer = game.questions.get(task.question_index)?.kind.clone();

    let host = HostEvent::QuestionResult {
        task_id: task.id,
        question_index: task.question_index,
        trigger: task.trigger,
        correct_answer,
        stats: stats(&task.results),
        results: task.results.iter().map(host_row).collect(),
    };

    let players = game
        .players()
        .map(|player| {
            let entry = task
                .results
                .iter()
                .find(|entry| entry.participant_id == player.id);
            let event = PlayerEvent::QuestionResult {
                task_id: task.id,
                question_index: task.question_index,
                eligible: entry.is_some(),
                answer: entry
                    .and_then(|entry| entry.answer.as_ref())
                    .map(|answer| answer.value.clone()),
                correct: entry.is_some_and(|entry| entry.correct),
                last_score: entry.map_or(0, |entry| entry.last_score),
                streak: player.streaks.current,
                response_time_ms: entry.and_then(|entry| entry.response_time_ms),
                rank: rank_context(game, player),
            };
            (player.id, event)
        })
        .collect();

    Some(Projection { host, players })
}

fn host_row(entry: &QuestionResultEntry) -> HostResultRow {
    HostResultRow {
        participant_id: entry.participant_id,
        nickname: entry.nickname.clone(),
        answer: entry.answer.as_ref().map(|answer| answer.value.clone()),
        correct: entry.correct,
        last_score: entry.last_score,
        total_score: entry.total_score,
        position: entry.position,
        previous_position: entry.previous_position,
        streak: entry.streak,
        response_time_ms: entry.response_time_ms,
    }
}

fn stats(results: &[QuestionResultEntry]) -> QuestionStats {
    let times: Vec<u64> = results
        .iter()
        .filter_map(|entry| entry.response_time_ms)
        .collect();
    let answered = times.len() as u32;
    QuestionStats {
        answered,
        unanswered: results.len() as u32 - answered,
        correct: results.iter().filter(|entry| entry.correct).count() as u32,
        average_response_time_ms: (!times.is_empty())
            .then(|| times.iter().sum::<u64>() / times.len() as u64),
    }
}

fn rank_context(game: &Game, player: &Player) -> RankContext {
    let points_behind = (player.rank > 1)
        .then(|| {
            game.players()
                .find(|other| other.rank == player.rank - 1)
                .map(|ahead| ahead.score.saturating_sub(player.score))
        })
        .flatten();
    RankContext {
        position: player.rank,
        previous_position: player.previous_rank,
        score: player.score,
        points_behind,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use uuid::Uuid;

    use super::*;
    use crate::{
        scoring::ScoringConfig,
        state::{
            game::{
                AnswerValue, ChoiceOption, CollectedAnswer, GameMode, GameSettings, Participant,
                QuestionSpec, SubmittedAnswer,
            },
            leaderboard::LeaderboardConfig,
            state_machine::{self, GameEvent, TransitionContext, TransitionOutcome},
            task::{CloseTrigger, TaskStatus},
        },
    };

    fn applied(outcome: TransitionOutcome) -> Transition {
        match outcome {
            TransitionOutcome::Applied(transition) => transition,
            TransitionOutcome::AlreadyApplied => panic!("transition was not applied"),
        }
    }

    fn two_player_game(now: SystemTime) -> (Game, ParticipantId, ParticipantId) {
        let question = QuestionSpec {
            text: "Largest planet?".into(),
            duration: 20,
            points: 1000,
            kind: QuestionKind::MultiChoice {
                options: vec![
                    ChoiceOption {
                        value: "Jupiter".into(),
                        correct: true,
                    },
                    ChoiceOption {
                        value: "Mars".into(),
                        correct: false,
                    },
                ],
            },
        };
        let mut game = Game::new(
            "123456".into(),
            GameMode::Classic,
            Uuid::new_v4(),
            vec![question.clone(), question],
            GameSettings::default(),
            now,
        );
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        for (id, name) in [(first, "first"), (second, "second")] {
            game.participants
                .push(Participant::Player(Player::new(id, name.into(), now)));
        }
        (game, first, second)
    }

    #[test]
    fn players_only_see_their_own_answer() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let scoring = ScoringConfig::default();
        let leaderboard = LeaderboardConfig::default();
        let ctx = TransitionContext {
            now,
            scoring: &scoring,
            leaderboard: &leaderboard,
        };
        let (mut game, first, second) = two_player_game(now);

        let lobby = game.current_task.id();
        let question = applied(
            state_machine::apply(&mut game, GameEvent::Advance { from_task: lobby }, &ctx)
                .unwrap(),
        );
        let host_question = project(&game, &question).unwrap().host;
        let HostEvent::Question(event) = host_question else {
            panic!("expected a question event");
        };
        assert_eq!(event.presented_at, "1970-01-12T13:46:40Z");
        assert_eq!(
            event.prompt,
            QuestionPrompt::MultiChoice {
                options: vec!["Jupiter".into(), "Mars".into()]
            }
        );

        let answered = CollectedAnswer {
            participant_id: first,
            answer: SubmittedAnswer {
                value: AnswerValue::MultiChoice { option: 0 },
                created: now + Duration::from_secs(2),
            },
        };
        let result = applied(
            state_machine::apply(
                &mut game,
                GameEvent::CloseQuestion {
                    task_id: question.task.id(),
                    trigger: CloseTrigger::Deadline,
                    answers: vec![answered],
                },
                &ctx,
            )
            .unwrap(),
        );
        let projection = project(&game, &result).unwrap();

        let HostEvent::QuestionResult { stats, results, .. } = &projection.host else {
            panic!("expected a question result for the host");
        };
        assert_eq!(stats.answered, 1);
        assert_eq!(stats.unanswered, 1);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.average_response_time_ms, Some(2000));
        assert_eq!(results.len(), 2);

        for (participant_id, event) in &projection.players {
            let PlayerEvent::QuestionResult { answer, rank, .. } = event else {
                panic!("expected a question result for the player");
            };
            if *participant_id == first {
                assert_eq!(answer, &Some(AnswerValue::MultiChoice { option: 0 }));
                assert_eq!(rank.position, 1);
                assert_eq!(rank.points_behind, None);
            } else {
                assert_eq!(*participant_id, second);
                assert_eq!(answer, &None);
                assert_eq!(rank.position, 2);
                assert_eq!(rank.points_behind, Some(950));
            }
        }
    }

    #[test]
    fn puzzle_prompt_shows_the_presented_order() {
        let kind = QuestionKind::Puzzle {
            values: vec!["1914".into(), "1939".into(), "1969".into()],
        };
        let task = QuestionTask {
            id: Uuid::new_v4(),
            status: TaskStatus::Active,
            created: SystemTime::UNIX_EPOCH,
            question_index: 0,
            presented: SystemTime::UNIX_EPOCH,
            eligible_players: Vec::new(),
            answers: Vec::new(),
            closed_by: None,
            prompt_order: vec!["1969".into(), "1914".into(), "1939".into()],
        };
        assert_eq!(
            prompt(&kind, &task),
            QuestionPrompt::Puzzle {
                values: vec!["1969".into(), "1914".into(), "1939".into()]
            }
        );
    }
}
