use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{FieldErrorKind, ValidationErrors};
use crate::model::ids::ModuleId;

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Raw module input as typed into a form.
///
/// Counts are signed so negative input reaches validation instead of failing
/// at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleDraft {
    pub title: String,
    pub lessons: i64,
    pub hours: i64,
    pub minutes: i64,
    pub completed: bool,
}

impl ModuleDraft {
    #[must_use]
    pub fn new(title: impl Into<String>, lessons: i64, hours: i64, minutes: i64) -> Self {
        Self {
            title: title.into(),
            lessons,
            hours,
            minutes,
            completed: false,
        }
    }

    #[must_use]
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Validate a standalone module draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationErrors` listing every rejected field.
    pub fn validate(self) -> Result<NewModule, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let module = self.validate_into("", &mut errors);
        module.ok_or(errors)
    }

    /// Validate as part of a larger form, reporting fields under `prefix`.
    pub(crate) fn validate_into(
        self,
        prefix: &str,
        errors: &mut ValidationErrors,
    ) -> Option<NewModule> {
        let before = errors.errors().len();

        let title = self.title.trim().to_owned();
        if title.is_empty() {
            errors.push(format!("{prefix}title"), FieldErrorKind::Required);
        }
        let lessons = non_negative(self.lessons, &format!("{prefix}lessons"), errors);
        let hours = non_negative(self.hours, &format!("{prefix}hours"), errors);
        let minutes = non_negative(self.minutes, &format!("{prefix}minutes"), errors);

        if errors.errors().len() != before {
            return None;
        }

        Some(NewModule {
            title,
            lessons,
            hours,
            minutes,
            completed: self.completed,
        })
    }
}

fn non_negative(value: i64, field: &str, errors: &mut ValidationErrors) -> u32 {
    if value < 0 {
        errors.push(field, FieldErrorKind::Negative);
        return 0;
    }
    u32::try_from(value).unwrap_or_else(|_| {
        errors.push(field, FieldErrorKind::TooLarge { max: u32::MAX });
        0
    })
}

/// A validated module that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewModule {
    pub title: String,
    pub lessons: u32,
    pub hours: u32,
    pub minutes: u32,
    pub completed: bool,
}

impl NewModule {
    /// Attach the store-assigned id.
    ///
    /// A module created already completed is stamped with `created_at`.
    #[must_use]
    pub fn assign_id(self, id: ModuleId, created_at: DateTime<Utc>) -> Module {
        Module {
            id,
            title: self.title,
            lessons: self.lessons,
            hours: self.hours,
            minutes: self.minutes,
            completed: self.completed,
            completed_at: self.completed.then_some(created_at),
        }
    }
}

//
// ─── PATCH ─────────────────────────────────────────────────────────────────────
//

/// Partial module update. Every `Some` field replaces the existing value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModulePatch {
    pub title: Option<String>,
    pub lessons: Option<u32>,
    pub hours: Option<u32>,
    pub minutes: Option<u32>,
    pub completed: Option<bool>,
}

impl ModulePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.lessons.is_none()
            && self.hours.is_none()
            && self.minutes.is_none()
            && self.completed.is_none()
    }

    /// Trim the title and reject an empty one.
    ///
    /// # Errors
    ///
    /// Returns `ValidationErrors` if the title is present but blank.
    pub fn validate(mut self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(title) = self.title.take() {
            let title = title.trim().to_owned();
            if title.is_empty() {
                errors.push("title", FieldErrorKind::Required);
            }
            self.title = Some(title);
        }
        errors.into_result(self)
    }
}

//
// ─── MODULE ────────────────────────────────────────────────────────────────────
//

/// A trackable unit of a course with a lesson count and duration.
///
/// `completed_at` is `Some` exactly when `completed` is true; every method that
/// changes completion keeps the two in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    id: ModuleId,
    title: String,
    lessons: u32,
    hours: u32,
    minutes: u32,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl Module {
    /// Rebuild a module from stored fields. Completion is derived from `completed_at`.
    #[must_use]
    pub fn from_persisted(
        id: ModuleId,
        title: impl Into<String>,
        lessons: u32,
        hours: u32,
        minutes: u32,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            lessons,
            hours,
            minutes,
            completed: completed_at.is_some(),
            completed_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lessons(&self) -> u32 {
        self.lessons
    }

    #[must_use]
    pub fn hours(&self) -> u32 {
        self.hours
    }

    #[must_use]
    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Flip completion, stamping `at` when it becomes complete.
    pub fn toggle(&mut self, at: DateTime<Utc>) {
        let completed = !self.completed;
        self.set_completed(completed, at);
    }

    /// Set completion. A no-op when the value does not change, so an existing
    /// `completed_at` is never overwritten.
    pub fn set_completed(&mut self, completed: bool, at: DateTime<Utc>) {
        if self.completed == completed {
            return;
        }
        self.completed = completed;
        self.completed_at = completed.then_some(at);
    }

    /// Merge a patch into a copy of this module; the patch wins field by field.
    #[must_use]
    pub fn patched(&self, patch: &ModulePatch, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title.clone_from(title);
        }
        if let Some(lessons) = patch.lessons {
            next.lessons = lessons;
        }
        if let Some(hours) = patch.hours {
            next.hours = hours;
        }
        if let Some(minutes) = patch.minutes {
            next.minutes = minutes;
        }
        if let Some(completed) = patch.completed {
            next.set_completed(completed, at);
        }
        next
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
