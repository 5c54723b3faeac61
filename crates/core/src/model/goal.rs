use serde::Serialize;

use crate::error::{FieldErrorKind, ValidationErrors};

/// The user's target daily study time. One per user.
///
/// `consider_weekends` is stored and returned but does not change projection
/// arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StudyGoal {
    daily_hours: f64,
    consider_weekends: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StudyGoalDraft {
    pub daily_hours: f64,
    pub consider_weekends: bool,
}

impl StudyGoalDraft {
    #[must_use]
    pub fn new(daily_hours: f64, consider_weekends: bool) -> Self {
        Self {
            daily_hours,
            consider_weekends,
        }
    }

    /// # Errors
    ///
    /// Returns `ValidationErrors` if `daily_hours` is negative or not finite.
    pub fn validate(self) -> Result<StudyGoal, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !self.daily_hours.is_finite() {
            errors.push("daily_hours", FieldErrorKind::NotFinite);
        } else if self.daily_hours < 0.0 {
            errors.push("daily_hours", FieldErrorKind::Negative);
        }
        errors.into_result(StudyGoal {
            daily_hours: self.daily_hours,
            consider_weekends: self.consider_weekends,
        })
    }
}

impl StudyGoal {
    #[must_use]
    pub fn from_persisted(daily_hours: f64, consider_weekends: bool) -> Self {
        Self {
            daily_hours,
            consider_weekends,
        }
    }

    #[must_use]
    pub fn daily_hours(&self) -> f64 {
        self.daily_hours
    }

    #[must_use]
    pub fn consider_weekends(&self) -> bool {
        self.consider_weekends
    }

    /// Whole minutes of study per day, or `None` when the goal gives no usable
    /// capacity.
    ///
    /// Rounded to the nearest minute and never below one, so `4.1` hours is
    /// 246 minutes even though `4.1 * 60.0` is not exact in `f64`.
    #[must_use]
    pub fn daily_minutes(&self) -> Option<u64> {
        let minutes = self.daily_hours * 60.0;
        if !minutes.is_finite() || minutes <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = minutes.round() as u64;
        Some(whole.max(1))
    }
}
