//! Field-level validation errors shared by every draft type.
//!
//! Drafts collect all problems before giving up so a form can show each one
//! next to the offending input.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// What went wrong with a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    TooShort { min: usize },
    Negative,
    TooLarge { max: u32 },
    NotFinite,
    InvalidUrl,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldErrorKind::Required => write!(f, "is required"),
            FieldErrorKind::TooShort { min } => write!(f, "must be at least {min} characters"),
            FieldErrorKind::Negative => write!(f, "must be greater than or equal to 0"),
            FieldErrorKind::TooLarge { max } => write!(f, "must be at most {max}"),
            FieldErrorKind::NotFinite => write!(f, "must be a finite number"),
            FieldErrorKind::InvalidUrl => write!(f, "must be a valid URL"),
        }
    }
}

/// A rejected input, addressed by its path in the form (`title`, `modules[2].hours`).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field} {kind}")]
pub struct FieldError {
    pub field: String,
    #[serde(flatten)]
    pub kind: FieldErrorKind,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Every field error found while validating one draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (idx, err) in self.errors.iter().enumerate() {
            let sep = if idx == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, kind: FieldErrorKind) {
        self.errors.push(FieldError::new(field, kind));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Errors reported against exactly `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |err| err.field == field)
    }

    /// Returns `value` when nothing was collected.
    ///
    /// # Errors
    ///
    /// Returns `self` if at least one field error was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_field() {
        let mut errors = ValidationErrors::new();
        errors.push("title", FieldErrorKind::TooShort { min: 2 });
        errors.push("modules[0].hours", FieldErrorKind::Negative);

        assert_eq!(
            errors.to_string(),
            "validation failed: title must be at least 2 characters; \
             modules[0].hours must be greater than or equal to 0"
        );
    }

    #[test]
    fn for_field_filters_by_exact_path() {
        let mut errors = ValidationErrors::new();
        errors.push("modules[1].title", FieldErrorKind::Required);
        errors.push("modules[10].title", FieldErrorKind::Required);

        assert_eq!(errors.for_field("modules[1].title").count(), 1);
        assert_eq!(errors.for_field("title").count(), 0);
    }

    #[test]
    fn into_result_passes_value_through_when_empty() {
        assert_eq!(ValidationErrors::new().into_result(5), Ok(5));
    }
}
