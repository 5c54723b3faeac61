use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::repository::{CourseRepository, StorageError};
use study_core::model::{
    CertificateDraft, Course, CourseDraft, CourseEdit, CourseId, CoursePatch, CourseUpdate,
    ModuleId, ModulePatch, StudyGoal,
};
use study_core::progress::{PortfolioProgress, portfolio_progress};
use study_core::projection::{CourseInsight, course_insights};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::cache::{CacheKey, QueryCache};
use crate::coordinator::{LocalMutation, MutationCoordinator};
use crate::error::CourseServiceError;
use crate::notices::{Notice, Notifications};

/// Course reads, writes and optimistic edits.
///
/// Reads go through the [`QueryCache`]. Toggle, patch and remove are shown
/// locally at once through the [`MutationCoordinator`] and settled against the
/// store; create and full edits wait for the store.
#[derive(Clone)]
pub struct CourseService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    cache: Arc<QueryCache>,
    coordinator: Arc<MutationCoordinator>,
    notices: Arc<Notifications>,
}

impl CourseService {
    #[must_use]
    pub fn new(clock: Clock, courses: Arc<dyn CourseRepository>) -> Self {
        Self::with_shared(
            clock,
            courses,
            Arc::new(QueryCache::new()),
            Arc::new(Notifications::new()),
        )
    }

    /// Build a service that shares its cache and notice inbox with others.
    #[must_use]
    pub fn with_shared(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        cache: Arc<QueryCache>,
        notices: Arc<Notifications>,
    ) -> Self {
        let coordinator = Arc::new(MutationCoordinator::new(Arc::clone(&notices)));
        Self {
            clock,
            courses,
            cache,
            coordinator,
            notices,
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> Arc<MutationCoordinator> {
        Arc::clone(&self.coordinator)
    }

    #[must_use]
    pub fn notices(&self) -> Arc<Notifications> {
        Arc::clone(&self.notices)
    }

    /// Drain pending success and error notices.
    pub fn take_notices(&self) -> Vec<Notice> {
        self.notices.take()
    }

    /// The locally displayed list, optimistic edits included.
    #[must_use]
    pub fn courses(&self) -> Vec<Course> {
        self.coordinator.courses()
    }

    /// Load the course list, from cache when fresh, and adopt it locally.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if the store cannot be read.
    pub async fn load_courses(&self) -> Result<Vec<Course>, CourseServiceError> {
        let courses = match self.cache.courses() {
            Some(cached) => cached,
            None => {
                let fetched = self.courses.list_courses().await?;
                self.cache.put_courses(fetched.clone());
                fetched
            }
        };
        self.coordinator.sync(courses);
        Ok(self.coordinator.courses())
    }

    /// Drop cached lists and reload from the store.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Storage` if the store cannot be read.
    pub async fn refresh(&self) -> Result<Vec<Course>, CourseServiceError> {
        self.cache.invalidate(CacheKey::Courses);
        self.load_courses().await
    }

    /// Fetch one course, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::NotFound` if the course does not exist.
    /// Returns `CourseServiceError::Storage` if the store cannot be read.
    pub async fn get_course(&self, id: CourseId) -> Result<Course, CourseServiceError> {
        if let Some(cached) = self.cache.course(id) {
            return Ok(cached);
        }
        let course = self.courses.get_course(id).await?;
        self.cache.put_course(course.clone());
        Ok(course)
    }

    /// Validate and persist a new course with its modules.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Validation` without touching the store if
    /// the draft is rejected.
    /// Returns `CourseServiceError::Storage` if persistence fails.
    pub async fn create_course(&self, draft: CourseDraft) -> Result<Course, CourseServiceError> {
        let new_course = draft.validate()?;
        let created = self
            .courses
            .create_course(new_course, self.clock.now())
            .await
            .map_err(|err| self.report_failure("Could not create course", err))?;

        info!(course_id = %created.id(), modules = created.modules().len(), "course created");
        self.cache.invalidate(CacheKey::Courses);
        self.notices.push(Notice::success("Course created"));
        self.reload_after_write().await;
        Ok(created)
    }

    /// Apply an edit form: title and, when given, the authoritative module list.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Validation` if the form is rejected.
    /// Returns `CourseServiceError::NotFound` if the course or a listed module
    /// does not exist.
    /// Returns `CourseServiceError::Storage` if persistence fails.
    pub async fn update_course(
        &self,
        id: CourseId,
        edit: CourseEdit,
    ) -> Result<Course, CourseServiceError> {
        let update = edit.validate()?;
        let updated = self
            .courses
            .update_course(id, &update, self.clock.now())
            .await
            .map_err(|err| self.report_failure("Could not update course", err))?;

        debug!(course_id = %id, "course updated");
        self.cache.invalidate(CacheKey::Courses);
        self.notices.push(Notice::success("Course updated"));
        self.reload_after_write().await;
        Ok(updated)
    }

    /// Optimistically rename a course or change its certificate.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Validation` if the patch is rejected.
    /// Returns `CourseServiceError::Mutation` if the course is not loaded.
    /// Returns the store error after rolling back if persistence fails.
    pub async fn patch_course(
        &self,
        id: CourseId,
        patch: CoursePatch,
    ) -> Result<(), CourseServiceError> {
        let patch = patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        let courses = Arc::clone(&self.courses);
        let update = CourseUpdate::from(patch.clone());
        self.run_optimistic(
            LocalMutation::PatchCourse {
                course_id: id,
                patch,
            },
            move |at| async move { courses.update_course(id, &update, at).await.map(|_| ()) },
        )
        .await
    }

    /// Attach or replace the course certificate.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Validation` if the URL does not parse.
    /// Otherwise as [`patch_course`](Self::patch_course).
    pub async fn set_certificate(
        &self,
        id: CourseId,
        draft: CertificateDraft,
    ) -> Result<(), CourseServiceError> {
        let certificate = draft.validate()?;
        self.patch_course(
            id,
            CoursePatch {
                title: None,
                certificate: Some(Some(certificate)),
            },
        )
        .await
    }

    /// Remove the course certificate.
    ///
    /// # Errors
    ///
    /// As [`patch_course`](Self::patch_course).
    pub async fn clear_certificate(&self, id: CourseId) -> Result<(), CourseServiceError> {
        self.patch_course(
            id,
            CoursePatch {
                title: None,
                certificate: Some(None),
            },
        )
        .await
    }

    /// Optimistically delete a course and its modules.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Mutation` if the course is not loaded.
    /// Returns the store error after rolling back if deletion fails.
    pub async fn delete_course(&self, id: CourseId) -> Result<(), CourseServiceError> {
        let courses = Arc::clone(&self.courses);
        self.run_optimistic(
            LocalMutation::RemoveCourse { course_id: id },
            move |_| async move { courses.delete_course(id).await },
        )
        .await?;
        info!(course_id = %id, "course deleted");
        Ok(())
    }

    /// Optimistically flip a module's completion.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Mutation` if the module is not loaded.
    /// Returns the store error after rolling back if persistence fails.
    pub async fn toggle_module(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
    ) -> Result<(), CourseServiceError> {
        let courses = Arc::clone(&self.courses);
        self.run_optimistic(
            LocalMutation::ToggleModule {
                course_id,
                module_id,
            },
            move |at| async move {
                courses
                    .toggle_module_completion(course_id, module_id, at)
                    .await
            },
        )
        .await
    }

    /// Optimistically change some fields of one module.
    ///
    /// # Errors
    ///
    /// Returns `CourseServiceError::Validation` if the patch is rejected.
    /// Returns `CourseServiceError::Mutation` if the module is not loaded.
    /// Returns the store error after rolling back if persistence fails.
    pub async fn patch_module(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        patch: ModulePatch,
    ) -> Result<(), CourseServiceError> {
        let patch = patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        let courses = Arc::clone(&self.courses);
        let persisted_patch = patch.clone();
        self.run_optimistic(
            LocalMutation::PatchModule {
                course_id,
                module_id,
                patch,
            },
            move |at| async move {
                courses
                    .update_module(course_id, module_id, &persisted_patch, at)
                    .await
            },
        )
        .await
    }

    /// Portfolio totals over the local list.
    #[must_use]
    pub fn portfolio(&self) -> PortfolioProgress {
        portfolio_progress(&self.coordinator.courses())
    }

    /// Completion estimates over the local list, dated from the service clock.
    #[must_use]
    pub fn insights(&self, goal: Option<&StudyGoal>) -> Vec<CourseInsight> {
        course_insights(&self.coordinator.courses(), goal, self.clock.today())
    }

    async fn ensure_loaded(&self) -> Result<(), CourseServiceError> {
        if !self.coordinator.is_synced() {
            self.load_courses().await?;
        }
        Ok(())
    }

    /// Preview `mutation` locally, persist it, then confirm with the
    /// store's list or roll back.
    async fn run_optimistic<F, Fut>(
        &self,
        mutation: LocalMutation,
        persist: F,
    ) -> Result<(), CourseServiceError>
    where
        F: FnOnce(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<(), StorageError>>,
    {
        self.ensure_loaded().await?;
        let at = self.clock.now();
        let ticket = self.coordinator.begin(mutation, at)?;

        let settled = match persist(at).await {
            Ok(()) => {
                self.cache.invalidate(CacheKey::Courses);
                self.courses.list_courses().await
            }
            Err(err) => Err(err),
        };

        match settled {
            Ok(server) => {
                self.cache.put_courses(server.clone());
                self.coordinator.confirm(ticket, server)?;
                Ok(())
            }
            Err(err) => {
                warn!(%ticket, error = %err, "mutation failed; rolling back");
                self.cache.invalidate(CacheKey::Courses);
                self.coordinator.rollback(ticket, &err.to_string())?;
                Err(err.into())
            }
        }
    }

    /// Adopt the store's list after a committed write. The write stands even
    /// if this read fails; the cache stays invalidated so the next load retries.
    async fn reload_after_write(&self) {
        if let Err(err) = self.load_courses().await {
            warn!(error = %err, "reload after write failed");
        }
    }

    fn report_failure(&self, title: &str, err: StorageError) -> StorageError {
        warn!(error = %err, "{title}");
        self.notices.push(Notice::error(title, err.to_string()));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use storage::repository::InMemoryRepository;
    use study_core::model::{ModuleDraft, ModuleEdit};
    use study_core::time::fixed_now;

    fn service() -> CourseService {
        CourseService::new(Clock::fixed(fixed_now()), Arc::new(InMemoryRepository::new()))
    }

    fn draft() -> CourseDraft {
        CourseDraft::new("Rust in Action")
            .with_module(ModuleDraft::new("Ownership", 4, 1, 30))
            .with_module(ModuleDraft::new("Traits", 3, 0, 30))
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_before_the_store() {
        let service = service();
        let err = service
            .create_course(CourseDraft::new("R").with_module(ModuleDraft::new("", -1, 0, 0)))
            .await
            .unwrap_err();

        let CourseServiceError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.for_field("title").next().is_some());
        assert!(errors.for_field("modules[0].title").next().is_some());
        assert!(errors.for_field("modules[0].lessons").next().is_some());
        assert!(service.load_courses().await.unwrap().is_empty());
        assert!(service.take_notices().is_empty());
    }

    #[tokio::test]
    async fn create_then_toggle_updates_progress() {
        let service = service();
        let course = service.create_course(draft()).await.unwrap();
        let first = course.modules()[0].id();

        service.toggle_module(course.id(), first).await.unwrap();

        let summary = service.portfolio();
        assert_eq!(summary.total_minutes, 120);
        assert_eq!(summary.completed_minutes, 90);
        assert_eq!(summary.overall_progress, 75);
        let titles: Vec<_> = service.take_notices().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, ["Course created", "Module updated"]);
    }

    #[tokio::test]
    async fn patch_module_persists_changed_fields_only() {
        let service = service();
        let course = service.create_course(draft()).await.unwrap();
        let second = course.modules()[1].id();

        service
            .patch_module(
                course.id(),
                second,
                ModulePatch {
                    minutes: Some(45),
                    ..ModulePatch::default()
                },
            )
            .await
            .unwrap();

        let stored = service.refresh().await.unwrap();
        let module = stored[0].module(second).unwrap();
        assert_eq!(module.minutes(), 45);
        assert_eq!(module.title(), "Traits");
        assert_eq!(module.lessons(), 3);
    }

    #[tokio::test]
    async fn certificate_can_be_set_and_cleared() {
        let service = service();
        let course = service.create_course(draft()).await.unwrap();

        let err = service
            .set_certificate(
                course.id(),
                CertificateDraft {
                    url: "not a url".into(),
                    issued_at: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CourseServiceError::Validation(_)));

        service
            .set_certificate(
                course.id(),
                CertificateDraft {
                    url: "https://example.com/rust.pdf".into(),
                    issued_at: None,
                },
            )
            .await
            .unwrap();
        let stored = service.get_course(course.id()).await.unwrap();
        assert_eq!(
            stored.certificate().map(|c| c.url()),
            Some("https://example.com/rust.pdf")
        );

        service.clear_certificate(course.id()).await.unwrap();
        assert!(service.get_course(course.id()).await.unwrap().certificate().is_none());
    }

    #[tokio::test]
    async fn update_course_reconciles_modules() {
        let service = service();
        let course = service.create_course(draft()).await.unwrap();
        let kept = &course.modules()[0];

        let updated = service
            .update_course(
                course.id(),
                CourseEdit {
                    title: Some("Rust in Action, 2nd ed.".into()),
                    modules: Some(vec![
                        ModuleEdit {
                            id: Some(kept.id()),
                            draft: ModuleDraft::new("Ownership", 4, 2, 0),
                        },
                        ModuleEdit {
                            id: None,
                            draft: ModuleDraft::new("Async", 5, 1, 0),
                        },
                    ]),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title(), "Rust in Action, 2nd ed.");
        let titles: Vec<_> = updated.modules().iter().map(|m| m.title()).collect();
        assert_eq!(titles, ["Ownership", "Async"]);
        assert_eq!(updated.modules()[0].id(), kept.id());
        assert_eq!(updated.modules()[0].hours(), 2);
    }

    #[tokio::test]
    async fn missing_course_maps_to_not_found() {
        let service = service();
        let err = service.get_course(CourseId::new(42)).await.unwrap_err();
        assert!(matches!(err, CourseServiceError::NotFound));
    }

    #[tokio::test]
    async fn delete_removes_course_locally_and_in_store() {
        let service = service();
        let course = service.create_course(draft()).await.unwrap();

        service.delete_course(course.id()).await.unwrap();

        assert!(service.courses().is_empty());
        assert!(service.refresh().await.unwrap().is_empty());
    }
}
