use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use url::Url;

use crate::error::{FieldErrorKind, ValidationErrors};
use crate::model::ids::{CourseId, ModuleId};
use crate::model::module::{Module, ModuleDraft, ModulePatch, NewModule};

/// Minimum trimmed length of a course title.
pub const MIN_COURSE_TITLE_LEN: usize = 2;

fn validate_title(raw: &str, errors: &mut ValidationErrors) -> String {
    let title = raw.trim().to_owned();
    if title.is_empty() {
        errors.push("title", FieldErrorKind::Required);
    } else if title.chars().count() < MIN_COURSE_TITLE_LEN {
        errors.push(
            "title",
            FieldErrorKind::TooShort {
                min: MIN_COURSE_TITLE_LEN,
            },
        );
    }
    title
}

//
// ─── CERTIFICATE ───────────────────────────────────────────────────────────────
//

/// Completion certificate attached to a course. Independent of progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Certificate {
    url: String,
    issued_at: Option<NaiveDate>,
}

impl Certificate {
    /// Rebuild a certificate from stored fields without re-validating the URL.
    #[must_use]
    pub fn from_persisted(url: impl Into<String>, issued_at: Option<NaiveDate>) -> Self {
        Self {
            url: url.into(),
            issued_at,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<NaiveDate> {
        self.issued_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateDraft {
    pub url: String,
    pub issued_at: Option<NaiveDate>,
}

impl CertificateDraft {
    /// # Errors
    ///
    /// Returns `ValidationErrors` if the URL is missing or does not parse.
    pub fn validate(self) -> Result<Certificate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let url = self.url.trim().to_owned();
        if url.is_empty() {
            errors.push("certificate.url", FieldErrorKind::Required);
        } else if Url::parse(&url).is_err() {
            errors.push("certificate.url", FieldErrorKind::InvalidUrl);
        }
        errors.into_result(Certificate {
            url,
            issued_at: self.issued_at,
        })
    }
}

//
// ─── CREATE ────────────────────────────────────────────────────────────────────
//

/// Raw course form: a title plus the modules typed alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CourseDraft {
    pub title: String,
    pub modules: Vec<ModuleDraft>,
}

impl CourseDraft {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            modules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_module(mut self, module: ModuleDraft) -> Self {
        self.modules.push(module);
        self
    }

    /// # Errors
    ///
    /// Returns `ValidationErrors` with one entry per rejected field, module
    /// fields addressed as `modules[i].<field>`.
    pub fn validate(self) -> Result<NewCourse, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let title = validate_title(&self.title, &mut errors);
        let modules = validate_modules(self.modules, &mut errors);
        errors.into_result(NewCourse { title, modules })
    }
}

fn validate_modules(drafts: Vec<ModuleDraft>, errors: &mut ValidationErrors) -> Vec<NewModule> {
    drafts
        .into_iter()
        .enumerate()
        .filter_map(|(idx, draft)| draft.validate_into(&format!("modules[{idx}]."), errors))
        .collect()
}

/// A validated course ready to be handed to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCourse {
    pub title: String,
    pub modules: Vec<NewModule>,
}

//
// ─── UPDATE ────────────────────────────────────────────────────────────────────
//

/// Partial course update. `Some` fields replace the existing value;
/// `certificate: Some(None)` clears the attachment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub certificate: Option<Option<Certificate>>,
}

impl CoursePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.certificate.is_none()
    }

    /// # Errors
    ///
    /// Returns `ValidationErrors` if a title is present but too short.
    pub fn validate(mut self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(raw) = self.title.take() {
            self.title = Some(validate_title(&raw, &mut errors));
        }
        errors.into_result(self)
    }
}

/// One row of an edited module list: rows with an id update that module,
/// rows without one create a new module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEdit {
    pub id: Option<ModuleId>,
    pub draft: ModuleDraft,
}

/// Raw edit-course form.
///
/// When `modules` is `Some`, the list is authoritative: existing modules not
/// listed are deleted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CourseEdit {
    pub title: Option<String>,
    pub modules: Option<Vec<ModuleEdit>>,
}

impl CourseEdit {
    /// # Errors
    ///
    /// Returns `ValidationErrors` for a short title or any rejected module row.
    pub fn validate(self) -> Result<CourseUpdate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let title = self.title.map(|raw| validate_title(&raw, &mut errors));
        let modules = self.modules.map(|rows| {
            rows.into_iter()
                .enumerate()
                .filter_map(|(idx, row)| {
                    row.draft
                        .validate_into(&format!("modules[{idx}]."), &mut errors)
                        .map(|module| ModuleChange { id: row.id, module })
                })
                .collect()
        });
        errors.into_result(CourseUpdate {
            patch: CoursePatch {
                title,
                certificate: None,
            },
            modules,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleChange {
    pub id: Option<ModuleId>,
    pub module: NewModule,
}

/// Validated update handed to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CourseUpdate {
    pub patch: CoursePatch,
    pub modules: Option<Vec<ModuleChange>>,
}

impl From<CoursePatch> for CourseUpdate {
    fn from(patch: CoursePatch) -> Self {
        Self {
            patch,
            modules: None,
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// An ordered collection of modules with a title.
///
/// Modules keep creation order. Progress figures are derived on demand by
/// [`crate::progress`] and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    id: CourseId,
    title: String,
    created_at: DateTime<Utc>,
    modules: Vec<Module>,
    certificate: Option<Certificate>,
}

impl Course {
    #[must_use]
    pub fn from_persisted(
        id: CourseId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        modules: Vec<Module>,
        certificate: Option<Certificate>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            created_at,
            modules,
            certificate,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| m.id() == id)
    }

    #[must_use]
    pub fn total_lessons(&self) -> u64 {
        self.modules.iter().map(|m| u64::from(m.lessons())).sum()
    }

    /// Complete means at least one module and every module done.
    /// A course with no modules is never complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.modules.is_empty() && self.modules.iter().all(Module::completed)
    }

    /// Copy of this course with one module's completion flipped.
    ///
    /// Returns `None` if the module does not belong to this course.
    #[must_use]
    pub fn with_module_toggled(&self, module_id: ModuleId, at: DateTime<Utc>) -> Option<Self> {
        let mut next = self.clone();
        next.modules
            .iter_mut()
            .find(|m| m.id() == module_id)?
            .toggle(at);
        Some(next)
    }

    /// Copy of this course with `patch` merged into one module.
    ///
    /// Returns `None` if the module does not belong to this course.
    #[must_use]
    pub fn with_module_patched(
        &self,
        module_id: ModuleId,
        patch: &ModulePatch,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        let mut next = self.clone();
        let slot = next.modules.iter_mut().find(|m| m.id() == module_id)?;
        *slot = slot.patched(patch, at);
        Some(next)
    }

    /// Copy of this course with the patch merged in; the patch wins field by field.
    #[must_use]
    pub fn patched(&self, patch: &CoursePatch) -> Self {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title.clone_from(title);
        }
        if let Some(certificate) = &patch.certificate {
            next.certificate.clone_from(certificate);
        }
        next
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
