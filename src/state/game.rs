use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    scoring::tolerance::{PinTolerance, RangeMargin},
    state::task::{LobbyTask, QuestionTask, Task, TaskStatus},
};

/// Identifier of a game session.
pub type GameId = Uuid;
/// Stable identifier of a host or player, issued by the authentication layer.
pub type ParticipantId = Uuid;
/// Identifier of a single task inside a game's history.
pub type TaskId = Uuid;

/// Selects the scoring variant and the set of legal question types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Points-based game mixing every classic question type.
    Classic,
    /// Precision game made exclusively of 0..=100 slider questions.
    ZeroToOneHundred,
}

/// Lifecycle status of a game. `Completed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Game accepts joins and transitions.
    Active,
    /// Game reached its podium and was finalized.
    Completed,
    /// Game was abandoned before producing a result.
    Expired,
}

impl GameStatus {
    /// Whether the status can never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::Active)
    }

    /// Stable storage key, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
            GameStatus::Expired => "expired",
        }
    }
}

/// Per-game flags enabling zero-delay completion of the pause tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Skip waiting for the host on question results.
    pub auto_complete_question_result: bool,
    /// Skip waiting for the host on intermediate leaderboards.
    pub auto_complete_leaderboard: bool,
    /// Finalize the game as soon as the podium is reached.
    pub auto_complete_podium: bool,
}

/// Question snapshot taken from the source quiz when the game was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Question text shown to everyone.
    pub text: String,
    /// Answering window in seconds.
    pub duration: u32,
    /// Points budget for a perfect, instant answer.
    pub points: u32,
    /// Type-specific payload carrying the correct answer.
    pub kind: QuestionKind,
}

impl QuestionSpec {
    /// Answering window as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration))
    }

    /// Discriminator of the question payload.
    pub fn question_type(&self) -> QuestionType {
        self.kind.question_type()
    }
}

/// Fieldless discriminator of [`QuestionKind`] and [`AnswerValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Pick one option.
    MultiChoice,
    /// True or false.
    TrueFalse,
    /// Free text.
    TypeAnswer,
    /// Number with a tolerance margin.
    Range,
    /// Point on an image.
    Pin,
    /// Order a list.
    Puzzle,
    /// Closest whole number from 0 to 100.
    ZeroToOneHundredRange,
}

/// One selectable option of a multiple choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Text of the option.
    pub value: String,
    /// Whether picking this option is correct.
    pub correct: bool,
}

/// Normalized position on a pin image, both axes in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinPoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl PinPoint {
    /// Whether both coordinates are inside the unit square.
    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &PinPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Type-specific question payload including the correct answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick exactly one of the options.
    MultiChoice {
        /// Options in display order.
        options: Vec<ChoiceOption>,
    },
    /// Decide whether a statement holds.
    TrueFalse {
        /// Expected answer.
        correct: bool,
    },
    /// Type the answer.
    TypeAnswer {
        /// Accepted spellings, compared case-insensitively.
        accepted: Vec<String>,
    },
    /// Pick a number.
    Range {
        /// Lowest value players may submit.
        min: f64,
        /// Highest value players may submit.
        max: f64,
        /// Target value.
        correct: f64,
        /// How far from the target still earns credit.
        margin: RangeMargin,
    },
    /// Place a pin.
    Pin {
        /// Target point.
        correct: PinPoint,
        /// How far from the target still earns credit.
        tolerance: PinTolerance,
    },
    /// Put the items back in order.
    Puzzle {
        /// Items in their correct order.
        values: Vec<String>,
    },
    /// Closest guess wins precision points.
    ZeroToOneHundredRange {
        /// Target value.
        correct: u8,
    },
}

impl QuestionKind {
    /// Discriminator of this payload.
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::MultiChoice { .. } => QuestionType::MultiChoice,
            QuestionKind::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionKind::TypeAnswer { .. } => QuestionType::TypeAnswer,
            QuestionKind::Range { .. } => QuestionType::Range,
            QuestionKind::Pin { .. } => QuestionType::Pin,
            QuestionKind::Puzzle { .. } => QuestionType::Puzzle,
            QuestionKind::ZeroToOneHundredRange { .. } => QuestionType::ZeroToOneHundredRange,
        }
    }
}

/// Answer payload as sent by a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Answer to a multiple choice question.
    MultiChoice {
        /// Zero-based option index.
        option: usize,
    },
    /// Answer to a true/false question.
    TrueFalse {
        /// Chosen truth value.
        value: bool,
    },
    /// Answer to a type-answer question.
    TypeAnswer {
        /// Typed text.
        value: String,
    },
    /// Answer to a range question.
    Range {
        /// Picked number.
        value: f64,
    },
    /// Answer to a pin question.
    Pin {
        /// Where the pin was dropped.
        position: PinPoint,
    },
    /// Answer to a puzzle.
    Puzzle {
        /// Items in the submitted order.
        values: Vec<String>,
    },
    /// Answer in a 0 to 100 game.
    ZeroToOneHundredRange {
        /// Guess.
        value: u8,
    },
}

impl AnswerValue {
    /// Discriminator of this payload.
    pub fn question_type(&self) -> QuestionType {
        match self {
            AnswerValue::MultiChoice { .. } => QuestionType::MultiChoice,
            AnswerValue::TrueFalse { .. } => QuestionType::TrueFalse,
            AnswerValue::TypeAnswer { .. } => QuestionType::TypeAnswer,
            AnswerValue::Range { .. } => QuestionType::Range,
            AnswerValue::Pin { .. } => QuestionType::Pin,
            AnswerValue::Puzzle { .. } => QuestionType::Puzzle,
            AnswerValue::ZeroToOneHundredRange { .. } => QuestionType::ZeroToOneHundredRange,
        }
    }
}

/// An accepted answer together with the instant it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    /// Answer payload.
    pub value: AnswerValue,
    /// Instant the answer was accepted.
    pub created: SystemTime,
}

/// Answer stored on a closed question task, keyed by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedAnswer {
    /// Author of the answer.
    pub participant_id: ParticipantId,
    /// The answer itself.
    pub answer: SubmittedAnswer,
}

/// Current and longest run of consecutive correct answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    /// Run still going.
    pub current: u32,
    /// Best run so far.
    pub longest: u32,
}

impl Streaks {
    /// Fold one graded answer into the streak counters.
    pub fn record(&mut self, correct: bool) {
        if correct {
            self.current += 1;
            self.longest = self.longest.max(self.current);
        } else {
            self.current = 0;
        }
    }
}

/// The single host of a game, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Participant id of the host.
    pub id: ParticipantId,
    /// Instant the game was created.
    pub created: SystemTime,
}

/// A player attached to a game and its running standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Participant id.
    pub id: ParticipantId,
    /// Display name, unique within the game.
    pub nickname: String,
    /// Cumulative score (points in classic mode, precision in 0..=100 mode).
    pub score: u32,
    /// Runs of correct answers.
    pub streaks: Streaks,
    /// Last computed position, `0` until the first ranking.
    pub rank: u32,
    /// Position before the last ranking, `0` when unranked.
    pub previous_rank: u32,
    /// Questions answered correctly.
    pub correct_answers: u32,
    /// Questions answered incorrectly.
    pub incorrect_answers: u32,
    /// Eligible questions left without an answer.
    pub unanswered: u32,
    /// Sum of response times of every answered question.
    pub total_response_time_ms: u64,
    /// Instant the player joined.
    pub created: SystemTime,
    /// Instant of the last score update.
    pub updated: SystemTime,
}

impl Player {
    /// Create a fresh player record.
    pub fn new(id: ParticipantId, nickname: String, now: SystemTime) -> Self {
        Self {
            id,
            nickname,
            score: 0,
            streaks: Streaks::default(),
            rank: 0,
            previous_rank: 0,
            correct_answers: 0,
            incorrect_answers: 0,
            unanswered: 0,
            total_response_time_ms: 0,
            created: now,
            updated: now,
        }
    }

    /// Number of questions this player answered in time.
    pub fn answered(&self) -> u32 {
        self.correct_answers + self.incorrect_answers
    }
}

/// Host or player attached to a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Participant {
    /// The game's host.
    Host(Host),
    /// A player.
    Player(Player),
}

impl Participant {
    /// Stable identifier of the participant.
    pub fn id(&self) -> ParticipantId {
        match self {
            Participant::Host(host) => host.id,
            Participant::Player(player) => player.id,
        }
    }
}

/// The game session aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Game identifier.
    pub id: GameId,
    /// Six digit join code, unique among active games.
    pub pin: String,
    /// Scoring mode.
    pub mode: GameMode,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Immutable snapshot of the quiz questions.
    pub questions: Vec<QuestionSpec>,
    /// Index of the next question to present.
    pub next_question: usize,
    /// Host first, then players in join order.
    pub participants: Vec<Participant>,
    /// Task the game is currently on.
    pub current_task: Task,
    /// Append-only task history.
    pub previous_tasks: Vec<Task>,
    /// Host-chosen automation settings.
    pub settings: GameSettings,
    /// Optimistic concurrency token, bumped by the store on every save.
    pub version: u64,
    /// Instant the game was created.
    pub created: SystemTime,
    /// Instant of the last save.
    pub updated: SystemTime,
}

impl Game {
    /// Build a new active game sitting in its lobby.
    pub fn new(
        pin: String,
        mode: GameMode,
        host_id: ParticipantId,
        questions: Vec<QuestionSpec>,
        settings: GameSettings,
        now: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pin,
            mode,
            status: GameStatus::Active,
            questions,
            next_question: 0,
            participants: vec![Participant::Host(Host {
                id: host_id,
                created: now,
            })],
            current_task: Task::Lobby(LobbyTask {
                id: Uuid::new_v4(),
                status: TaskStatus::Pending,
                created: now,
            }),
            previous_tasks: Vec::new(),
            settings,
            version: 0,
            created: now,
            updated: now,
        }
    }

    /// Identifier of the host.
    pub fn host_id(&self) -> Option<ParticipantId> {
        self.participants.iter().find_map(|participant| match participant {
            Participant::Host(host) => Some(host.id),
            Participant::Player(_) => None,
        })
    }

    /// Whether `id` belongs to the host.
    pub fn is_host(&self, id: ParticipantId) -> bool {
        self.host_id() == Some(id)
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.participants
            .iter()
            .filter_map(|participant| match participant {
                Participant::Player(player) => Some(player),
                Participant::Host(_) => None,
            })
    }

    /// Look up a player by id.
    pub fn player(&self, id: ParticipantId) -> Option<&Player> {
        self.players().find(|player| player.id == id)
    }

    /// Look up a player by id, mutably.
    pub fn player_mut(&mut self, id: ParticipantId) -> Option<&mut Player> {
        self.participants
            .iter_mut()
            .find_map(|participant| match participant {
                Participant::Player(player) if player.id == id => Some(player),
                _ => None,
            })
    }

    /// Number of players (host excluded).
    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    /// Whether a task with this id was already superseded.
    pub fn has_previous_task(&self, id: TaskId) -> bool {
        self.previous_tasks.iter().any(|task| task.id() == id)
    }

    /// Active question task with its specification, if any.
    pub fn current_question(&self) -> Option<(&QuestionTask, &QuestionSpec)> {
        match &self.current_task {
            Task::Question(task) => self
                .questions
                .get(task.question_index)
                .map(|question| (task, question)),
            _ => None,
        }
    }

    /// Whether the active question's answering window has elapsed at `now`.
    pub fn question_deadline_passed(&self, now: SystemTime) -> bool {
        self.current_question()
            .is_some_and(|(task, question)| now > task.presented + question.duration())
    }
}
