//! Margin tiers for Range questions and tolerance radii for Pin questions.

use serde::{Deserialize, Serialize};

use crate::state::game::PinPoint;

/// Accepted deviation for Range questions, relative to `|correct|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMargin {
    /// Exact value only.
    None,
    /// 5%.
    Low,
    /// 10%.
    Medium,
    /// 20%.
    High,
    /// Any value is accepted.
    Maximum,
}

impl RangeMargin {
    /// Fraction of `|correct|` accepted, `None` when unbounded.
    pub fn fraction(self) -> Option<f64> {
        match self {
            RangeMargin::None => Some(0.0),
            RangeMargin::Low => Some(0.05),
            RangeMargin::Medium => Some(0.10),
            RangeMargin::High => Some(0.20),
            RangeMargin::Maximum => None,
        }
    }
}

/// Accepted radius around the correct pin, in normalized image units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinTolerance {
    /// Radius 0.05.
    Low,
    /// Radius 0.10.
    Medium,
    /// Radius 0.20.
    High,
    /// Radius 0.40.
    Maximum,
}

impl PinTolerance {
    /// Radius of the accepted disc.
    pub fn radius(self) -> f64 {
        match self {
            PinTolerance::Low => 0.05,
            PinTolerance::Medium => 0.10,
            PinTolerance::High => 0.20,
            PinTolerance::Maximum => 0.40,
        }
    }
}

/// Credit factor in `floor..=1.0` for a Range answer, `None` when outside the margin.
///
/// Bounded margins scale linearly from full credit at the correct value down to
/// `floor` at the margin boundary. The unbounded margin scales over the whole
/// `min..=max` span so the factor never increases with distance.
pub fn range_factor(
    margin: RangeMargin,
    correct: f64,
    answer: f64,
    min: f64,
    max: f64,
    floor: f64,
) -> Option<f64> {
    if !answer.is_finite() {
        return None;
    }

    let distance = (answer - correct).abs();
    match margin.fraction() {
        Some(fraction) => {
            let tolerance = correct.abs() * fraction;
            if distance == 0.0 {
                Some(1.0)
            } else if distance > tolerance {
                None
            } else {
                Some(linear_factor(distance, tolerance, floor))
            }
        }
        None => {
            let span = (max - min).abs().max(f64::EPSILON);
            Some(linear_factor(distance.min(span), span, floor))
        }
    }
}

/// Credit factor in `floor..=1.0` for a Pin answer, `None` when outside the radius.
pub fn pin_factor(
    tolerance: PinTolerance,
    correct: &PinPoint,
    answer: &PinPoint,
    floor: f64,
) -> Option<f64> {
    let distance = correct.distance(answer);
    let radius = tolerance.radius();
    if !distance.is_finite() || distance > radius {
        return None;
    }
    Some(linear_factor(distance, radius, floor))
}

fn linear_factor(distance: f64, limit: f64, floor: f64) -> f64 {
    if limit <= 0.0 {
        return 1.0;
    }
    let floor = floor.clamp(0.0, 1.0);
    if distance >= limit {
        return floor;
    }
    (1.0 - (distance / limit).max(0.0) * (1.0 - floor)).max(floor)
}
