//! Role-scoped event payloads pushed to hosts and players.

use serde::Serialize;

use crate::state::{
    game::{AnswerValue, GameStatus, ParticipantId, QuestionKind, QuestionType, TaskId},
    task::{CloseTrigger, LeaderboardEntry},
};

/// A question was presented.
pub const EVENT_QUESTION: &str = "question";
/// A question closed and was graded.
pub const EVENT_QUESTION_RESULT: &str = "question_result";
/// Standings between questions.
pub const EVENT_LEADERBOARD: &str = "leaderboard";
/// Final standings.
pub const EVENT_PODIUM: &str = "podium";
/// The game reached a terminal status on its own.
pub const EVENT_GAME_ENDED: &str = "game.ended";
/// The host ended the game.
pub const EVENT_QUIT: &str = "quit";
/// Someone joined the room.
pub const EVENT_PLAYER_JOINED: &str = "player.joined";
/// Submission counter for the open question, host only.
pub const EVENT_SUBMISSIONS_UPDATED: &str = "submissions.updated";

/// What a question asks, without its answer key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionPrompt {
    /// Pick one of the listed options.
    MultiChoice {
        /// Option labels, indexed by the answer.
        options: Vec<String>,
    },
    /// Answer true or false.
    TrueFalse,
    /// Type free text.
    TypeAnswer,
    /// Pick a number inside the bounds.
    Range {
        /// Lowest accepted value.
        min: f64,
        /// Highest accepted value.
        max: f64,
    },
    /// Place a pin on the picture.
    Pin,
    /// Items to order, in the scrambled order drawn when the question opened.
    Puzzle {
        /// Items to reorder.
        values: Vec<String>,
    },
    /// Pick a whole number from 0 to 100.
    ZeroToOneHundredRange,
}

/// Question as shown on every screen while it is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionEvent {
    /// Question task the answers must target.
    pub task_id: TaskId,
    /// Zero-based position in the game.
    pub question_index: usize,
    /// Number of questions in the game.
    pub question_count: usize,
    /// Question text.
    pub text: String,
    /// Kind of answer expected.
    pub question_type: QuestionType,
    /// Seconds to answer.
    pub duration: u32,
    /// Base points for a correct answer.
    pub points: u32,
    /// Answer choices without the key.
    pub prompt: QuestionPrompt,
    /// RFC 3339 instant the countdown started.
    pub presented_at: String,
    /// Players expected to answer.
    pub eligible_players: u32,
}

/// Aggregates shown to the room once a question closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionStats {
    /// Eligible players who answered.
    pub answered: u32,
    /// Eligible players who did not.
    pub unanswered: u32,
    /// Correct answers.
    pub correct: u32,
    /// Mean response time of the answers, `None` when nobody answered.
    pub average_response_time_ms: Option<u64>,
}

/// One graded player as seen by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostResultRow {
    /// Player graded.
    pub participant_id: ParticipantId,
    /// Display name.
    pub nickname: String,
    /// Submitted answer, if any.
    pub answer: Option<AnswerValue>,
    /// Whether the answer earned credit.
    pub correct: bool,
    /// Points earned on this question.
    pub last_score: u32,
    /// Cumulative score.
    pub total_score: u32,
    /// Rank after this question.
    pub position: u32,
    /// Rank before this question, `0` when unranked.
    pub previous_position: u32,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Time taken to answer.
    pub response_time_ms: Option<u64>,
}

/// Events addressed to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A question opened.
    Question(QuestionEvent),
    /// Full grading of the closed question.
    QuestionResult {
        /// Result task.
        task_id: TaskId,
        /// Question that closed.
        question_index: usize,
        /// What closed it.
        trigger: CloseTrigger,
        /// The question with its answer key.
        correct_answer: QuestionKind,
        /// Room-wide aggregates.
        stats: QuestionStats,
        /// Every eligible player, ranked.
        results: Vec<HostResultRow>,
    },
    /// Standings between questions.
    Leaderboard {
        /// Leaderboard task.
        task_id: TaskId,
        /// Last question played.
        question_index: usize,
        /// Top of the standings.
        entries: Vec<LeaderboardEntry>,
    },
    /// Final standings.
    Podium {
        /// Podium task.
        task_id: TaskId,
        /// Top of the final standings.
        entries: Vec<LeaderboardEntry>,
    },
    /// The game finished on its own.
    GameEnded {
        /// Terminal status.
        status: GameStatus,
    },
    /// The host ended the game.
    Quit {
        /// Terminal status.
        status: GameStatus,
    },
}

impl HostEvent {
    /// SSE event name carried by this payload.
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::Question(_) => EVENT_QUESTION,
            HostEvent::QuestionResult { .. } => EVENT_QUESTION_RESULT,
            HostEvent::Leaderboard { .. } => EVENT_LEADERBOARD,
            HostEvent::Podium { .. } => EVENT_PODIUM,
            HostEvent::GameEnded { .. } => EVENT_GAME_ENDED,
            HostEvent::Quit { .. } => EVENT_QUIT,
        }
    }
}

/// A player's own standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankContext {
    /// Current rank, `0` when unranked.
    pub position: u32,
    /// Rank before the last question.
    pub previous_position: u32,
    /// Cumulative score.
    pub score: u32,
    /// Gap to the player ranked right above, `None` for the leader or unranked players.
    pub points_behind: Option<u32>,
}

/// Events addressed to a single player.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// A question opened.
    Question(QuestionEvent),
    /// The player's own grading of the closed question.
    QuestionResult {
        /// Result task.
        task_id: TaskId,
        /// Question that closed.
        question_index: usize,
        /// `false` for players who joined after the question was presented.
        eligible: bool,
        /// What the player submitted.
        answer: Option<AnswerValue>,
        /// Whether the answer earned credit.
        correct: bool,
        /// Points earned on this question.
        last_score: u32,
        /// Consecutive correct answers.
        streak: u32,
        /// Time taken to answer.
        response_time_ms: Option<u64>,
        /// Standing after this question.
        rank: RankContext,
    },
    /// Standings between questions.
    Leaderboard {
        /// Leaderboard task.
        task_id: TaskId,
        /// Last question played.
        question_index: usize,
        /// Top of the standings.
        entries: Vec<LeaderboardEntry>,
        /// The player's own standing.
        rank: RankContext,
    },
    /// Final standings.
    Podium {
        /// Podium task.
        task_id: TaskId,
        /// Top of the final standings.
        entries: Vec<LeaderboardEntry>,
        /// The player's final standing.
        rank: RankContext,
    },
    /// The game finished on its own.
    GameEnded {
        /// Terminal status.
        status: GameStatus,
    },
    /// The host ended the game.
    Quit {
        /// Terminal status.
        status: GameStatus,
    },
}

impl PlayerEvent {
    /// SSE event name carried by this payload.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Question(_) => EVENT_QUESTION,
            PlayerEvent::QuestionResult { .. } => EVENT_QUESTION_RESULT,
            PlayerEvent::Leaderboard { .. } => EVENT_LEADERBOARD,
            PlayerEvent::Podium { .. } => EVENT_PODIUM,
            PlayerEvent::GameEnded { .. } => EVENT_GAME_ENDED,
            PlayerEvent::Quit { .. } => EVENT_QUIT,
        }
    }
}

/// Broadcast when a player enters the lobby or joins mid-game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerJoinedEvent {
    /// The new player.
    pub participant_id: ParticipantId,
    /// Display name.
    pub nickname: String,
    /// Players in the room after the join.
    pub player_count: u32,
}

/// Sent to the host after each accepted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmissionsUpdatedEvent {
    /// Open question task.
    pub task_id: TaskId,
    /// Answers received.
    pub current: u32,
    /// Answers expected.
    pub total: u32,
}
