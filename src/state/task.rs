//! Tagged task union describing each phase of a game session.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::state::game::{
    CollectedAnswer, ParticipantId, Streaks, SubmittedAnswer, TaskId,
};

/// Discriminator of [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Waiting room.
    Lobby,
    /// Open question.
    Question,
    /// Graded question.
    QuestionResult,
    /// Standings between questions.
    Leaderboard,
    /// Final standings.
    Podium,
    /// Ended by the host.
    Quit,
}

impl TaskType {
    /// Stable storage key, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Lobby => "Lobby",
            TaskType::Question => "Question",
            TaskType::QuestionResult => "QuestionResult",
            TaskType::Leaderboard => "Leaderboard",
            TaskType::Podium => "Podium",
            TaskType::Quit => "Quit",
        }
    }
}

/// Progress of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    Pending,
    /// Running.
    Active,
    /// Finished.
    Completed,
}

/// What closed a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    /// Every eligible player submitted.
    Quorum,
    /// The answering window elapsed.
    Deadline,
    /// The host skipped ahead.
    Host,
}

/// Waiting room before the first question. Pending until the first player joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyTask {
    /// Task identifier.
    pub id: TaskId,
    /// Progress of the task.
    pub status: TaskStatus,
    /// Instant the task was entered.
    pub created: SystemTime,
}

/// A question open for answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTask {
    /// Task identifier.
    pub id: TaskId,
    /// Progress of the task.
    pub status: TaskStatus,
    /// Instant the task was entered.
    pub created: SystemTime,
    /// Index of the question in the game.
    pub question_index: usize,
    /// Instant the question became visible; the response-time origin.
    pub presented: SystemTime,
    /// Players present when the question was presented.
    pub eligible_players: Vec<ParticipantId>,
    /// Accepted answers, filled in when the question closes.
    pub answers: Vec<CollectedAnswer>,
    /// What closed the question, once closed.
    pub closed_by: Option<CloseTrigger>,
    /// Puzzle items in the scrambled order shown to players; empty for
    /// other question types.
    #[serde(default)]
    pub prompt_order: Vec<String>,
}

/// Graded outcome of one player for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResultEntry {
    /// Player graded.
    pub participant_id: ParticipantId,
    /// Display name at grading time.
    pub nickname: String,
    /// Submitted answer, `None` when the player did not answer.
    pub answer: Option<SubmittedAnswer>,
    /// Whether the answer earned credit.
    pub correct: bool,
    /// Score earned on this question.
    pub last_score: u32,
    /// Cumulative score after this question.
    pub total_score: u32,
    /// Rank after this question.
    pub position: u32,
    /// Rank before this question.
    pub previous_position: u32,
    /// Consecutive correct answers after this question.
    pub streak: u32,
    /// Time taken to answer.
    pub response_time_ms: Option<u64>,
}

/// Graded outcome of the question that just closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResultTask {
    /// Task identifier.
    pub id: TaskId,
    /// Progress of the task.
    pub status: TaskStatus,
    /// Instant the task was entered.
    pub created: SystemTime,
    /// Index of the question in the game.
    pub question_index: usize,
    /// The question task this result closes.
    pub question_task_id: TaskId,
    /// What closed the question.
    pub trigger: CloseTrigger,
    /// One entry per eligible player, ordered by position.
    pub results: Vec<QuestionResultEntry>,
}

/// A single row of a leaderboard or podium snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Ranked player.
    pub participant_id: ParticipantId,
    /// Rank, starting at 1.
    pub position: u32,
    /// Position before the last graded question, `0` on the first ranking.
    pub previous_position: u32,
    /// Display name.
    pub nickname: String,
    /// Cumulative score.
    pub score: u32,
    /// Runs of correct answers.
    pub streaks: Streaks,
}

/// Intermediate ranking shown between questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardTask {
    /// Task identifier.
    pub id: TaskId,
    /// Progress of the task.
    pub status: TaskStatus,
    /// Instant the task was entered.
    pub created: SystemTime,
    /// Index of the question in the game.
    pub question_index: usize,
    /// Top entries only.
    pub entries: Vec<LeaderboardEntry>,
}

/// Final ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodiumTask {
    /// Task identifier.
    pub id: TaskId,
    /// Progress of the task.
    pub status: TaskStatus,
    /// Instant the task was entered.
    pub created: SystemTime,
    /// Top entries of the final ranking.
    pub entries: Vec<LeaderboardEntry>,
}

/// Early termination requested by the host. Terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuitTask {
    /// Task identifier.
    pub id: TaskId,
    /// Progress of the task.
    pub status: TaskStatus,
    /// Instant the task was entered.
    pub created: SystemTime,
}

/// One phase of a game session, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
    /// Waiting room.
    Lobby(LobbyTask),
    /// Open question.
    Question(QuestionTask),
    /// Graded question.
    QuestionResult(QuestionResultTask),
    /// Standings between questions.
    Leaderboard(LeaderboardTask),
    /// Final standings.
    Podium(PodiumTask),
    /// Ended by the host.
    Quit(QuitTask),
}

impl Task {
    /// Identifier of the task.
    pub fn id(&self) -> TaskId {
        match self {
            Task::Lobby(task) => task.id,
            Task::Question(task) => task.id,
            Task::QuestionResult(task) => task.id,
            Task::Leaderboard(task) => task.id,
            Task::Podium(task) => task.id,
            Task::Quit(task) => task.id,
        }
    }

    /// Discriminator of the task.
    pub fn task_type(&self) -> TaskType {
        match self {
            Task::Lobby(_) => TaskType::Lobby,
            Task::Question(_) => TaskType::Question,
            Task::QuestionResult(_) => TaskType::QuestionResult,
            Task::Leaderboard(_) => TaskType::Leaderboard,
            Task::Podium(_) => TaskType::Podium,
            Task::Quit(_) => TaskType::Quit,
        }
    }

    /// Current progress of the task.
    pub fn status(&self) -> TaskStatus {
        match self {
            Task::Lobby(task) => task.status,
            Task::Question(task) => task.status,
            Task::QuestionResult(task) => task.status,
            Task::Leaderboard(task) => task.status,
            Task::Podium(task) => task.status,
            Task::Quit(task) => task.status,
        }
    }

    /// Overwrite the progress of the task.
    pub fn set_status(&mut self, status: TaskStatus) {
        match self {
            Task::Lobby(task) => task.status = status,
            Task::Question(task) => task.status = status,
            Task::QuestionResult(task) => task.status = status,
            Task::Leaderboard(task) => task.status = status,
            Task::Podium(task) => task.status = status,
            Task::Quit(task) => task.status = status,
        }
    }
}
