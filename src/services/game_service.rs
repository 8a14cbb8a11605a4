use rand::Rng;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    dao::storage::StorageError,
    dto::game::{CreateGameRequest, GameResults, GameSummary, JoinGameRequest, JoinGameResponse},
    error::ServiceError,
    scoring,
    services::{dispatch, play_service},
    state::{
        SharedState,
        game::{Game, GameId, GameStatus, Participant, ParticipantId, Player},
        leaderboard,
        task::{Task, TaskStatus, TaskType},
    },
};

/// PINs drawn before giving up on finding a free one.
const PIN_ATTEMPTS: usize = 5;
/// Save attempts of a join racing other joins or transitions.
const JOIN_ATTEMPTS: usize = 3;

/// Create a game hosted by `host_id` and persist it with a fresh PIN.
pub async fn create_game(
    state: &SharedState,
    host_id: ParticipantId,
    request: CreateGameRequest,
) -> Result<GameSummary, ServiceError> {
    request.validate()?;
    let CreateGameRequest {
        mode,
        questions,
        settings,
    } = request;
    for (index, question) in questions.iter().enumerate() {
        scoring::ensure_supported(mode, question.question_type())
            .map_err(|err| ServiceError::InvalidInput(format!("question {index}: {err}")))?;
    }

    for attempt in 1..=PIN_ATTEMPTS {
        let game = Game::new(
            generate_pin(),
            mode,
            host_id,
            questions.clone(),
            settings,
            state.now(),
        );
        match state.store().create_game(game).await {
            Ok(game) => {
                info!(game_id = %game.id, pin = %game.pin, %host_id, questions = game.questions.len(), "game created");
                return Ok(GameSummary::for_viewer(&game, host_id));
            }
            Err(StorageError::Duplicate { what }) => {
                debug!(attempt, %what, "pin already in use; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(
        "could not allocate a unique game pin".into(),
    ))
}

/// Add `participant_id` as a player of the active game behind the requested PIN.
///
/// Rejoining with the same participant id returns the existing player.
pub async fn join_game(
    state: &SharedState,
    participant_id: ParticipantId,
    request: JoinGameRequest,
) -> Result<JoinGameResponse, ServiceError> {
    request.validate()?;
    let nickname = request.nickname.trim().to_string();
    let limits = &state.config().gameplay;
    let length = nickname.chars().count();
    if length < limits.nickname_min_length || length > limits.nickname_max_length {
        return Err(ServiceError::InvalidInput(format!(
            "nickname must be between {} and {} characters",
            limits.nickname_min_length, limits.nickname_max_length
        )));
    }

    let mut game = state
        .store()
        .find_active_game_by_pin(request.pin.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no active game with pin {}", request.pin)))?;

    for attempt in 1..=JOIN_ATTEMPTS {
        if let Some(player) = game.player(participant_id) {
            return Ok(JoinGameResponse {
                game_id: game.id,
                participant_id,
                nickname: player.nickname.clone(),
            });
        }
        ensure_joinable(&game, participant_id, &nickname, limits.max_players)?;

        let now = state.now();
        let mut player = Player::new(participant_id, nickname.clone(), now);
        player.rank = leaderboard::rank_for_newcomer(&game.participants);
        game.participants.push(Participant::Player(player.clone()));
        if let Task::Lobby(lobby) = &mut game.current_task {
            if lobby.status == TaskStatus::Pending {
                lobby.status = TaskStatus::Active;
            }
        }
        game.updated = now;

        let game_id = game.id;
        match state.store().save_game(game).await {
            Ok(saved) => {
                info!(%game_id, %participant_id, nickname = %player.nickname, "player joined");
                dispatch::publish_player_joined(state, &saved, &player);
                return Ok(JoinGameResponse {
                    game_id,
                    participant_id,
                    nickname: player.nickname,
                });
            }
            Err(err) if err.is_conflict() => {
                debug!(%game_id, attempt, "join lost a write race; reloading");
                game = state.load_game(game_id).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(
        "game is too busy to join right now".into(),
    ))
}

/// Role-aware snapshot of a game for one of its participants.
pub async fn game_summary(
    state: &SharedState,
    game_id: GameId,
    viewer: ParticipantId,
) -> Result<GameSummary, ServiceError> {
    let game = state.load_game(game_id).await?;
    ensure_participant(&game, viewer)?;
    let game = play_service::enforce_deadline(state, game).await?;
    Ok(GameSummary::for_viewer(&game, viewer))
}

/// Full final ranking, available once the game reached its podium.
pub async fn game_results(
    state: &SharedState,
    game_id: GameId,
    viewer: ParticipantId,
) -> Result<GameResults, ServiceError> {
    let game = state.load_game(game_id).await?;
    ensure_participant(&game, viewer)?;

    let finished = game.status == GameStatus::Completed
        || game.current_task.task_type() == TaskType::Podium;
    if !finished {
        return Err(ServiceError::Conflict(
            "results are available once the game reached its podium".into(),
        ));
    }

    Ok(GameResults {
        game_id: game.id,
        status: game.status,
        standings: leaderboard::final_standings(&game.participants),
    })
}

fn ensure_participant(game: &Game, participant_id: ParticipantId) -> Result<(), ServiceError> {
    if game.is_host(participant_id) || game.player(participant_id).is_some() {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "participant {participant_id} is not part of game {}",
            game.id
        )))
    }
}

fn ensure_joinable(
    game: &Game,
    participant_id: ParticipantId,
    nickname: &str,
    max_players: usize,
) -> Result<(), ServiceError> {
    if game.status.is_terminal()
        || matches!(
            game.current_task.task_type(),
            TaskType::Podium | TaskType::Quit
        )
    {
        return Err(ServiceError::GameEnded(game.status.as_str().into()));
    }
    if game.is_host(participant_id) {
        return Err(ServiceError::InvalidInput(
            "the host cannot join as a player".into(),
        ));
    }
    let lowered = nickname.to_lowercase();
    if game
        .players()
        .any(|player| player.nickname.to_lowercase() == lowered)
    {
        return Err(ServiceError::Conflict(format!(
            "nickname {nickname:?} is already taken"
        )));
    }
    if game.player_count() >= max_players {
        return Err(ServiceError::Conflict("the game is full".into()));
    }
    Ok(())
}

/// Random six-digit PIN, zero padded.
fn generate_pin() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_are_six_digits() {
        for _ in 0..100 {
            let pin = generate_pin();
            assert_eq!(pin.len(), 6);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
