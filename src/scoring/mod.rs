//! Pure grading rules: answer correctness, time decay and partial credit.
//!
//! Nothing here touches a [`Game`](crate::state::game::Game); every function is a
//! pure mapping from a question, an optional answer and its timing to a verdict.

pub mod tolerance;

use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::game::{AnswerValue, GameMode, QuestionKind, QuestionSpec, QuestionType, SubmittedAnswer};

use self::tolerance::{pin_factor, range_factor};

/// Tunables of the scoring rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Fraction of the points budget left for an answer landing right at the deadline.
    pub time_factor_floor: f64,
    /// Fraction of the points budget left at the edge of a Range/Pin tolerance.
    pub distance_factor_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            time_factor_floor: 0.5,
            distance_factor_floor: 0.1,
        }
    }
}

/// Programming errors raised by the scoring rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// The question type cannot be played in this game mode.
    #[error("question type {question_type:?} is not supported in {mode:?} games")]
    UnsupportedQuestionType {
        /// Mode of the game.
        mode: GameMode,
        /// Offending question type.
        question_type: QuestionType,
    },
}

/// Reasons a submitted answer is refused before it is recorded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnswerError {
    /// The answer targets another question type.
    #[error("expected a {expected:?} answer, got {actual:?}")]
    WrongType {
        /// Type of the open question.
        expected: QuestionType,
        /// Type of the submitted answer.
        actual: QuestionType,
    },
    /// The picked option index does not exist.
    #[error("option {option} does not exist (question has {len} options)")]
    OptionOutOfRange {
        /// Submitted index.
        option: usize,
        /// Number of options.
        len: usize,
    },
    /// Number or pin outside the accepted bounds.
    #[error("value is outside the allowed bounds")]
    OutOfBounds,
    /// Blank text answer.
    #[error("answer must not be empty")]
    Empty,
    /// The ordering drops, repeats or invents items.
    #[error("ordering must be a permutation of the question values")]
    NotAPermutation,
}

/// Outcome of grading a single player on a single question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grade {
    /// Whether the answer earned credit.
    pub correct: bool,
    /// Points earned.
    pub score: u32,
    /// Time between presentation and submission, `None` when no valid answer exists.
    pub response_time: Option<Duration>,
}

impl Grade {
    /// Grade of a player who did not answer in time.
    pub const ABSENT: Grade = Grade {
        correct: false,
        score: 0,
        response_time: None,
    };
}

/// Fail when `question_type` is not legal in `mode`.
pub fn ensure_supported(mode: GameMode, question_type: QuestionType) -> Result<(), ScoringError> {
    let supported = match mode {
        GameMode::Classic => question_type != QuestionType::ZeroToOneHundredRange,
        GameMode::ZeroToOneHundred => question_type == QuestionType::ZeroToOneHundredRange,
    };
    if supported {
        Ok(())
    } else {
        Err(ScoringError::UnsupportedQuestionType {
            mode,
            question_type,
        })
    }
}

/// Elapsed time between presentation and `answered`, clamped at zero.
pub fn response_time(presented: SystemTime, answered: SystemTime) -> Duration {
    answered.duration_since(presented).unwrap_or(Duration::ZERO)
}

/// Linear decay from `1.0` at presentation to `floor` at the deadline.
///
/// Returns `None` for an answer received after the deadline.
pub fn time_factor(elapsed: Duration, duration: Duration, floor: f64) -> Option<f64> {
    if elapsed > duration {
        return None;
    }
    if duration.is_zero() {
        return Some(1.0);
    }
    let floor = floor.clamp(0.0, 1.0);
    let ratio = elapsed.as_secs_f64() / duration.as_secs_f64();
    Some(1.0 - (1.0 - floor) * ratio)
}

/// Whether `answer` is correct for `question`. An absent answer is never correct.
pub fn is_correct(
    mode: GameMode,
    question: &QuestionSpec,
    answer: Option<&AnswerValue>,
    config: &ScoringConfig,
) -> Result<bool, ScoringError> {
    ensure_supported(mode, question.question_type())?;
    let Some(answer) = answer else {
        return Ok(false);
    };

    let correct = match (&question.kind, answer) {
        (QuestionKind::MultiChoice { options }, AnswerValue::MultiChoice { option }) => {
            options.get(*option).is_some_and(|choice| choice.correct)
        }
        (QuestionKind::TrueFalse { correct }, AnswerValue::TrueFalse { value }) => correct == value,
        (QuestionKind::TypeAnswer { accepted }, AnswerValue::TypeAnswer { value }) => {
            let value = normalize_text(value);
            !value.is_empty()
                && accepted
                    .iter()
                    .any(|candidate| normalize_text(candidate) == value)
        }
        (
            QuestionKind::Range {
                min,
                max,
                correct,
                margin,
            },
            AnswerValue::Range { value },
        ) => range_factor(
            *margin,
            *correct,
            *value,
            *min,
            *max,
            config.distance_factor_floor,
        )
        .is_some(),
        (QuestionKind::Pin { correct, tolerance }, AnswerValue::Pin { position }) => {
            pin_factor(*tolerance, correct, position, config.distance_factor_floor).is_some()
        }
        (QuestionKind::Puzzle { values }, AnswerValue::Puzzle { values: submitted }) => {
            values == submitted
        }
        (
            QuestionKind::ZeroToOneHundredRange { correct },
            AnswerValue::ZeroToOneHundredRange { value },
        ) => correct == value,
        _ => false,
    };
    Ok(correct)
}

/// Score earned by `answer`. Absent, late and incorrect answers score `0`.
pub fn calculate_score(
    mode: GameMode,
    question: &QuestionSpec,
    presented: SystemTime,
    answer: Option<&SubmittedAnswer>,
    config: &ScoringConfig,
) -> Result<u32, ScoringError> {
    grade(mode, question, presented, answer, config).map(|grade| grade.score)
}

/// Correctness, score and response time of `answer` in one pass.
pub fn grade(
    mode: GameMode,
    question: &QuestionSpec,
    presented: SystemTime,
    answer: Option<&SubmittedAnswer>,
    config: &ScoringConfig,
) -> Result<Grade, ScoringError> {
    ensure_supported(mode, question.question_type())?;
    let Some(answer) = answer else {
        return Ok(Grade::ABSENT);
    };

    let elapsed = response_time(presented, answer.created);
    let Some(time) = time_factor(elapsed, question.duration(), config.time_factor_floor) else {
        return Ok(Grade::ABSENT);
    };

    let correct = is_correct(mode, question, Some(&answer.value), config)?;
    let score = match (&question.kind, &answer.value) {
        (
            QuestionKind::ZeroToOneHundredRange { correct },
            AnswerValue::ZeroToOneHundredRange { value },
        ) => precision_score(*correct, *value),
        (
            QuestionKind::Range {
                min,
                max,
                correct,
                margin,
            },
            AnswerValue::Range { value },
        ) => range_factor(
            *margin,
            *correct,
            *value,
            *min,
            *max,
            config.distance_factor_floor,
        )
        .map_or(0, |distance| points(question.points, time * distance)),
        (QuestionKind::Pin { correct, tolerance }, AnswerValue::Pin { position }) => {
            pin_factor(*tolerance, correct, position, config.distance_factor_floor)
                .map_or(0, |distance| points(question.points, time * distance))
        }
        _ if correct => points(question.points, time),
        _ => 0,
    };

    Ok(Grade {
        correct,
        score,
        response_time: Some(elapsed),
    })
}

/// Check that `answer` is well formed for `question` before it is recorded.
pub fn validate_answer(question: &QuestionSpec, answer: &AnswerValue) -> Result<(), AnswerError> {
    let expected = question.question_type();
    let actual = answer.question_type();
    if expected != actual {
        return Err(AnswerError::WrongType { expected, actual });
    }

    match (&question.kind, answer) {
        (QuestionKind::MultiChoice { options }, AnswerValue::MultiChoice { option }) => {
            if *option >= options.len() {
                return Err(AnswerError::OptionOutOfRange {
                    option: *option,
                    len: options.len(),
                });
            }
        }
        (QuestionKind::TypeAnswer { .. }, AnswerValue::TypeAnswer { value }) => {
            if value.trim().is_empty() {
                return Err(AnswerError::Empty);
            }
        }
        (QuestionKind::Range { min, max, .. }, AnswerValue::Range { value }) => {
            let (low, high) = if min <= max { (*min, *max) } else { (*max, *min) };
            if !value.is_finite() || *value < low || *value > high {
                return Err(AnswerError::OutOfBounds);
            }
        }
        (QuestionKind::Pin { .. }, AnswerValue::Pin { position }) => {
            if !position.is_normalized() {
                return Err(AnswerError::OutOfBounds);
            }
        }
        (QuestionKind::Puzzle { values }, AnswerValue::Puzzle { values: submitted }) => {
            if !is_permutation(values, submitted) {
                return Err(AnswerError::NotAPermutation);
            }
        }
        (QuestionKind::ZeroToOneHundredRange { .. }, AnswerValue::ZeroToOneHundredRange { value }) => {
            if *value > 100 {
                return Err(AnswerError::OutOfBounds);
            }
        }
        _ => {}
    }
    Ok(())
}

fn points(budget: u32, factor: f64) -> u32 {
    (f64::from(budget) * factor.clamp(0.0, 1.0)).round() as u32
}

fn precision_score(correct: u8, answer: u8) -> u32 {
    100u32.saturating_sub(u32::from(correct.abs_diff(answer)))
}

fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_permutation(expected: &[String], submitted: &[String]) -> bool {
    if expected.len() != submitted.len() {
        return false;
    }
    let mut expected_sorted: Vec<&String> = expected.iter().collect();
    let mut submitted_sorted: Vec<&String> = submitted.iter().collect();
    expected_sorted.sort();
    submitted_sorted.sort();
    expected_sorted == submitted_sorted
        && submitted.iter().collect::<HashSet<_>>().len() == submitted.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::tolerance::{PinTolerance, RangeMargin};
    use crate::state::game::{ChoiceOption, PinPoint};

    fn question(kind: QuestionKind) -> QuestionSpec {
        QuestionSpec {
            text: "question".into(),
            duration: 20,
            points: 1000,
            kind,
        }
    }

    fn multi_choice() -> QuestionSpec {
        question(QuestionKind::MultiChoice {
            options: vec![
                ChoiceOption {
                    value: "Paris".into(),
                    correct: true,
                },
                ChoiceOption {
                    value: "Lyon".into(),
                    correct: false,
                },
            ],
        })
    }

    fn submitted(value: AnswerValue, presented: SystemTime, after: Duration) -> SubmittedAnswer {
        SubmittedAnswer {
            value,
            created: presented + after,
        }
    }

    fn every_kind() -> Vec<(GameMode, QuestionSpec)> {
        vec![
            (GameMode::Classic, multi_choice()),
            (GameMode::Classic, question(QuestionKind::TrueFalse { correct: true })),
            (
                GameMode::Classic,
                question(QuestionKind::TypeAnswer {
                    accepted: vec!["Rust".into()],
                }),
            ),
            (
                GameMode::Classic,
                question(QuestionKind::Range {
                    min: 0.0,
                    max: 100.0,
                    correct: 50.0,
                    margin: RangeMargin::Maximum,
                }),
            ),
            (
                GameMode::Classic,
                question(QuestionKind::Pin {
                    correct: PinPoint { x: 0.5, y: 0.5 },
                    tolerance: PinTolerance::Maximum,
                }),
            ),
            (
                GameMode::Classic,
                question(QuestionKind::Puzzle {
                    values: vec!["a".into(), "b".into(), "c".into()],
                }),
            ),
            (
                GameMode::ZeroToOneHundred,
                question(QuestionKind::ZeroToOneHundredRange { correct: 42 }),
            ),
        ]
    }

    #[test]
    fn absent_answers_score_zero_for_every_type() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        for (mode, question) in every_kind() {
            assert_eq!(calculate_score(mode, &question, presented, None, &config), Ok(0));
            assert_eq!(is_correct(mode, &question, None, &config), Ok(false));
        }
    }

    #[test]
    fn fast_correct_answer_decays_with_time() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        let answer = submitted(
            AnswerValue::MultiChoice { option: 0 },
            presented,
            Duration::from_secs(2),
        );
        let grade = grade(GameMode::Classic, &multi_choice(), presented, Some(&answer), &config)
            .unwrap();
        assert!(grade.correct);
        assert_eq!(grade.score, 950);
        assert_eq!(grade.response_time, Some(Duration::from_secs(2)));
    }

    #[test]
    fn answer_at_deadline_keeps_floor_and_late_answer_is_absent() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        let question = multi_choice();

        let at_deadline = submitted(
            AnswerValue::MultiChoice { option: 0 },
            presented,
            Duration::from_secs(20),
        );
        assert_eq!(
            calculate_score(GameMode::Classic, &question, presented, Some(&at_deadline), &config),
            Ok(500)
        );

        let late = submitted(
            AnswerValue::MultiChoice { option: 0 },
            presented,
            Duration::from_millis(20_001),
        );
        let grade = grade(GameMode::Classic, &question, presented, Some(&late), &config).unwrap();
        assert_eq!(grade, Grade::ABSENT);
    }

    #[test]
    fn wrong_choice_scores_zero() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        let answer = submitted(
            AnswerValue::MultiChoice { option: 1 },
            presented,
            Duration::from_secs(1),
        );
        let grade = grade(GameMode::Classic, &multi_choice(), presented, Some(&answer), &config)
            .unwrap();
        assert!(!grade.correct);
        assert_eq!(grade.score, 0);
        assert!(grade.response_time.is_some());
    }

    #[test]
    fn type_answer_ignores_case_and_whitespace() {
        let config = ScoringConfig::default();
        let question = question(QuestionKind::TypeAnswer {
            accepted: vec!["New  York".into(), "NYC".into()],
        });
        for value in ["new york", "  NEW\tYORK ", "nyc"] {
            let answer = AnswerValue::TypeAnswer {
                value: value.into(),
            };
            assert_eq!(
                is_correct(GameMode::Classic, &question, Some(&answer), &config),
                Ok(true),
                "{value} should match"
            );
        }
        let answer = AnswerValue::TypeAnswer {
            value: "newyork".into(),
        };
        assert_eq!(
            is_correct(GameMode::Classic, &question, Some(&answer), &config),
            Ok(false)
        );
    }

    #[test]
    fn puzzle_is_all_or_nothing() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        let question = question(QuestionKind::Puzzle {
            values: vec!["a".into(), "b".into(), "c".into()],
        });
        let exact = submitted(
            AnswerValue::Puzzle {
                values: vec!["a".into(), "b".into(), "c".into()],
            },
            presented,
            Duration::ZERO,
        );
        let swapped = submitted(
            AnswerValue::Puzzle {
                values: vec!["a".into(), "c".into(), "b".into()],
            },
            presented,
            Duration::ZERO,
        );
        assert_eq!(
            calculate_score(GameMode::Classic, &question, presented, Some(&exact), &config),
            Ok(1000)
        );
        assert_eq!(
            calculate_score(GameMode::Classic, &question, presented, Some(&swapped), &config),
            Ok(0)
        );
    }

    #[test]
    fn range_partial_credit_combines_with_time() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        let question = question(QuestionKind::Range {
            min: 0.0,
            max: 200.0,
            correct: 100.0,
            margin: RangeMargin::Medium,
        });
        let halfway = submitted(AnswerValue::Range { value: 105.0 }, presented, Duration::ZERO);
        assert_eq!(
            calculate_score(GameMode::Classic, &question, presented, Some(&halfway), &config),
            Ok(550)
        );
        let outside = submitted(AnswerValue::Range { value: 120.0 }, presented, Duration::ZERO);
        let grade = grade(GameMode::Classic, &question, presented, Some(&outside), &config).unwrap();
        assert!(!grade.correct);
        assert_eq!(grade.score, 0);
    }

    #[test]
    fn precision_score_ignores_points_budget_and_time() {
        let config = ScoringConfig::default();
        let presented = SystemTime::UNIX_EPOCH;
        let question = question(QuestionKind::ZeroToOneHundredRange { correct: 40 });
        let near = submitted(
            AnswerValue::ZeroToOneHundredRange { value: 47 },
            presented,
            Duration::from_secs(19),
        );
        let grade = grade(GameMode::ZeroToOneHundred, &question, presented, Some(&near), &config)
            .unwrap();
        assert_eq!(grade.score, 93);
        assert!(!grade.correct);

        let exact = submitted(
            AnswerValue::ZeroToOneHundredRange { value: 40 },
            presented,
            Duration::ZERO,
        );
        assert_eq!(
            is_correct(GameMode::ZeroToOneHundred, &question, Some(&exact.value), &config),
            Ok(true)
        );
    }

    #[test]
    fn question_types_are_checked_against_mode() {
        let config = ScoringConfig::default();
        let err = is_correct(GameMode::ZeroToOneHundred, &multi_choice(), None, &config)
            .unwrap_err();
        assert_eq!(
            err,
            ScoringError::UnsupportedQuestionType {
                mode: GameMode::ZeroToOneHundred,
                question_type: QuestionType::MultiChoice,
            }
        );
        let slider = question(QuestionKind::ZeroToOneHundredRange { correct: 1 });
        assert!(ensure_supported(GameMode::Classic, slider.question_type()).is_err());
    }

    #[test]
    fn validation_rejects_malformed_answers() {
        let question = multi_choice();
        assert_eq!(
            validate_answer(&question, &AnswerValue::MultiChoice { option: 7 }),
            Err(AnswerError::OptionOutOfRange { option: 7, len: 2 })
        );
        assert_eq!(
            validate_answer(&question, &AnswerValue::TrueFalse { value: true }),
            Err(AnswerError::WrongType {
                expected: QuestionType::MultiChoice,
                actual: QuestionType::TrueFalse,
            })
        );

        let puzzle = super::tests::question(QuestionKind::Puzzle {
            values: vec!["a".into(), "b".into(), "c".into()],
        });
        assert_eq!(
            validate_answer(
                &puzzle,
                &AnswerValue::Puzzle {
                    values: vec!["a".into(), "a".into(), "c".into()],
                }
            ),
            Err(AnswerError::NotAPermutation)
        );

        let pin = super::tests::question(QuestionKind::Pin {
            correct: PinPoint { x: 0.1, y: 0.1 },
            tolerance: PinTolerance::Low,
        });
        assert_eq!(
            validate_answer(
                &pin,
                &AnswerValue::Pin {
                    position: PinPoint { x: 1.2, y: 0.1 },
                }
            ),
            Err(AnswerError::OutOfBounds)
        );
    }
}
