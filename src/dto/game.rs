use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::{
    dao::submissions::SubmissionCounts,
    dto::{
        format_system_time,
        validation::{
            validate_duration, validate_nickname, validate_pin, validate_points,
            validate_question_kind,
        },
    },
    state::{
        game::{
            AnswerValue, Game, GameId, GameMode, GameSettings, GameStatus, ParticipantId,
            QuestionSpec,
        },
        leaderboard::FinalStanding,
        state_machine::QuitStatus,
        task::{TaskStatus, TaskType},
    },
};

/// Payload used to create a new game hosted by the calling participant.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGameRequest {
    /// Scoring mode of the game.
    pub mode: GameMode,
    /// Questions in presentation order.
    #[validate(length(min = 1, max = 100))]
    #[validate(nested)]
    pub questions: Vec<QuestionSpec>,
    /// Automation of the pause tasks.
    #[serde(default)]
    pub settings: GameSettings,
}

impl Validate for QuestionSpec {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.text.trim().is_empty() {
            let mut err = validator::ValidationError::new("text_blank");
            err.message = Some("Question text must not be blank".into());
            errors.add("text", err);
        }
        if let Err(e) = validate_duration(self.duration) {
            errors.add("duration", e);
        }
        if let Err(e) = validate_points(self.points) {
            errors.add("points", e);
        }
        if let Err(e) = validate_question_kind(&self.kind) {
            errors.add("kind", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload used by a player to enter a game through its PIN.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinGameRequest {
    /// Six digit join code.
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
    /// Display name, unique within the game.
    #[validate(length(min = 1, max = 64), custom(function = "validate_nickname"))]
    pub nickname: String,
}

/// Answer submitted by a player for the open question.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    /// Answer payload; its type must match the open question.
    pub answer: AnswerValue,
}

/// Terminal status requested by the host when quitting.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedStatus {
    /// The game produced a result worth keeping.
    Completed,
    /// The game was abandoned.
    #[default]
    Expired,
}

impl From<RequestedStatus> for QuitStatus {
    fn from(status: RequestedStatus) -> Self {
        match status {
            RequestedStatus::Completed => QuitStatus::Completed,
            RequestedStatus::Expired => QuitStatus::Expired,
        }
    }
}

/// Optional body of the quit endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct QuitGameRequest {
    /// Terminal status, `expired` when omitted.
    #[serde(default)]
    pub status: RequestedStatus,
}

/// Role of the participant a read model was rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    /// The game's host.
    Host,
    /// One of the players.
    Player,
}

/// Role-aware snapshot of a game.
#[derive(Debug, Serialize)]
pub struct GameSummary {
    /// Game identifier.
    pub id: GameId,
    /// Join code.
    pub pin: String,
    /// Scoring mode.
    pub mode: GameMode,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Role of the viewer.
    pub role: ViewerRole,
    /// Current task type.
    pub current_task: TaskType,
    /// Progress of the current task.
    pub task_status: TaskStatus,
    /// Questions presented so far.
    pub questions_presented: usize,
    /// Questions in the game.
    pub question_count: usize,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
    /// RFC 3339 creation instant.
    pub created_at: String,
    /// RFC 3339 instant of the last change.
    pub updated_at: String,
}

/// Player row of a [`GameSummary`]. Score and rank are only filled for the
/// host and for the viewer's own row.
#[derive(Debug, Serialize)]
pub struct PlayerSummary {
    /// Player id.
    pub participant_id: ParticipantId,
    /// Display name.
    pub nickname: String,
    /// Cumulative score, when visible.
    pub score: Option<u32>,
    /// Current rank, when visible.
    pub rank: Option<u32>,
}

impl GameSummary {
    /// Render `game` for the participant `viewer`.
    pub fn for_viewer(game: &Game, viewer: ParticipantId) -> Self {
        let role = if game.is_host(viewer) {
            ViewerRole::Host
        } else {
            ViewerRole::Player
        };
        let players = game
            .players()
            .map(|player| {
                let visible = role == ViewerRole::Host || player.id == viewer;
                PlayerSummary {
                    participant_id: player.id,
                    nickname: player.nickname.clone(),
                    score: visible.then_some(player.score),
                    rank: visible.then_some(player.rank),
                }
            })
            .collect();

        Self {
            id: game.id,
            pin: game.pin.clone(),
            mode: game.mode,
            status: game.status,
            role,
            current_task: game.current_task.task_type(),
            task_status: game.current_task.status(),
            questions_presented: game.next_question,
            question_count: game.questions.len(),
            players,
            created_at: format_system_time(game.created),
            updated_at: format_system_time(game.updated),
        }
    }
}

/// Returned once a player joined (or rejoined) a game.
#[derive(Debug, Serialize)]
pub struct JoinGameResponse {
    /// Game joined.
    pub game_id: GameId,
    /// Caller's participant id.
    pub participant_id: ParticipantId,
    /// Nickname the caller plays under.
    pub nickname: String,
}

/// Acknowledgement of an accepted answer.
#[derive(Debug, Serialize)]
pub struct SubmissionAck {
    /// Always `true`; rejections are errors.
    pub accepted: bool,
    /// Answers received so far.
    pub current: u32,
    /// Answers expected.
    pub total: u32,
}

impl From<SubmissionCounts> for SubmissionAck {
    fn from(counts: SubmissionCounts) -> Self {
        Self {
            accepted: true,
            current: counts.current,
            total: counts.total,
        }
    }
}

/// Current task of a game after a host command.
#[derive(Debug, Serialize)]
pub struct TaskSnapshot {
    /// Game identifier.
    pub game_id: GameId,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current task type.
    pub task_type: TaskType,
    /// Progress of the current task.
    pub task_status: TaskStatus,
}

impl From<&Game> for TaskSnapshot {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.id,
            status: game.status,
            task_type: game.current_task.task_type(),
            task_status: game.current_task.status(),
        }
    }
}

/// Full final ranking of a finished game.
#[derive(Debug, Serialize)]
pub struct GameResults {
    /// Game identifier.
    pub game_id: GameId,
    /// Terminal status.
    pub status: GameStatus,
    /// Every player, best first.
    pub standings: Vec<FinalStanding>,
}
