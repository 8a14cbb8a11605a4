//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::state::game::{ChoiceOption, QuestionKind};

/// Accepted question durations, in seconds.
pub const DURATION_RANGE: std::ops::RangeInclusive<u32> = 5..=300;
/// Points budgets a question may carry.
pub const ALLOWED_POINTS: [u32; 3] = [0, 1000, 2000];
/// Minimum number of items a puzzle must order.
pub const MIN_PUZZLE_VALUES: usize = 3;

fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates that a game PIN is exactly six ASCII digits.
///
/// ```ignore
/// validate_pin("042917") // Ok
/// validate_pin("42917")  // Err - too short
/// validate_pin("04291a") // Err - not a digit
/// ```
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(error(
            "pin_format",
            format!("PIN must be exactly 6 digits (got {pin:?})"),
        ));
    }
    Ok(())
}

/// Rejects nicknames made only of whitespace.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    if nickname.trim().is_empty() {
        return Err(error("nickname_blank", "Nickname must not be blank".into()));
    }
    Ok(())
}

/// Answering window in seconds must sit in the allowed range.
pub fn validate_duration(duration: u32) -> Result<(), ValidationError> {
    if !DURATION_RANGE.contains(&duration) {
        return Err(error(
            "duration_range",
            format!(
                "Duration must be between {} and {} seconds (got {duration})",
                DURATION_RANGE.start(),
                DURATION_RANGE.end()
            ),
        ));
    }
    Ok(())
}

/// Base points must be one of the allowed budgets.
pub fn validate_points(points: u32) -> Result<(), ValidationError> {
    if !ALLOWED_POINTS.contains(&points) {
        return Err(error(
            "points_budget",
            format!("Points must be one of {ALLOWED_POINTS:?} (got {points})"),
        ));
    }
    Ok(())
}

/// Checks that the answer key of a question is well formed.
pub fn validate_question_kind(kind: &QuestionKind) -> Result<(), ValidationError> {
    match kind {
        QuestionKind::MultiChoice { options } => validate_options(options),
        QuestionKind::TrueFalse { .. } => Ok(()),
        QuestionKind::TypeAnswer { accepted } => {
            if accepted.is_empty() || accepted.iter().any(|value| value.trim().is_empty()) {
                return Err(error(
                    "accepted_answers",
                    "At least one accepted answer is required and none may be blank".into(),
                ));
            }
            Ok(())
        }
        QuestionKind::Range {
            min, max, correct, ..
        } => {
            if !(min.is_finite() && max.is_finite() && correct.is_finite()) || min >= max {
                return Err(error(
                    "range_bounds",
                    format!("Range bounds must be finite with min < max (got {min}..{max})"),
                ));
            }
            if correct < min || correct > max {
                return Err(error(
                    "range_correct",
                    format!("Correct value {correct} lies outside {min}..={max}"),
                ));
            }
            Ok(())
        }
        QuestionKind::Pin { correct, .. } => {
            if !correct.is_normalized() {
                return Err(error(
                    "pin_position",
                    "Pin coordinates must lie within 0..=1".into(),
                ));
            }
            Ok(())
        }
        QuestionKind::Puzzle { values } => {
            let distinct: HashSet<&str> = values.iter().map(String::as_str).collect();
            if values.len() < MIN_PUZZLE_VALUES
                || distinct.len() != values.len()
                || values.iter().any(|value| value.trim().is_empty())
            {
                return Err(error(
                    "puzzle_values",
                    format!(
                        "Puzzle needs at least {MIN_PUZZLE_VALUES} distinct, non-blank values"
                    ),
                ));
            }
            Ok(())
        }
        QuestionKind::ZeroToOneHundredRange { correct } => {
            if *correct > 100 {
                return Err(error(
                    "precision_range",
                    format!("Correct value must be within 0..=100 (got {correct})"),
                ));
            }
            Ok(())
        }
    }
}

fn validate_options(options: &[ChoiceOption]) -> Result<(), ValidationError> {
    if options.len() < 2 {
        return Err(error(
            "options_count",
            format!("At least 2 options are required (got {})", options.len()),
        ));
    }
    if options.iter().any(|option| option.value.trim().is_empty()) {
        return Err(error("options_blank", "Options must not be blank".into()));
    }
    if !options.iter().any(|option| option.correct) {
        return Err(error(
            "options_correct",
            "At least one option must be correct".into(),
        ));
    }
    Ok(())
}
