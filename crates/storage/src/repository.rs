use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use study_core::model::{
    Course, CourseId, CourseUpdate, Module, ModuleChange, ModuleId, ModulePatch, NewCourse,
    StudyGoal,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
///
/// Every variant is recoverable: callers report it and let the user retry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for courses and their modules.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// All courses, oldest first, each with modules in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the courses cannot be read.
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError>;

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError>;

    /// Insert a course and its modules, returning the stored course with
    /// assigned ids.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn create_course(
        &self,
        course: NewCourse,
        created_at: DateTime<Utc>,
    ) -> Result<Course, StorageError>;

    /// Apply a partial update and return the course as stored. When
    /// `update.modules` is present the module list is reconciled: listed ids
    /// are updated, rows without an id are created, unlisted modules are
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course or a listed module id is
    /// missing, or other storage errors.
    async fn update_course(
        &self,
        id: CourseId,
        update: &CourseUpdate,
        at: DateTime<Utc>,
    ) -> Result<Course, StorageError>;

    /// Merge a partial patch into one module, leaving its siblings and any
    /// field the patch omits untouched. `completed_at` is stamped with `at`
    /// when the module becomes complete and cleared when it stops being so.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the module is not part of the course.
    async fn update_module(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        patch: &ModulePatch,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Delete a course and all of its modules.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn delete_course(&self, id: CourseId) -> Result<(), StorageError>;

    /// Flip a module's completion, setting `completed_at = at` when it becomes
    /// complete and clearing it otherwise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the module is not part of the course.
    async fn toggle_module_completion(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Repository contract for the singleton study goal.
#[async_trait]
pub trait GoalRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read failures. A missing goal is `Ok(None)`.
    async fn get_goal(&self) -> Result<Option<StudyGoal>, StorageError>;

    /// Insert or replace the goal, returning what was stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the goal cannot be stored.
    async fn upsert_goal(&self, goal: &StudyGoal) -> Result<StudyGoal, StorageError>;
}

/// Full-field patch that rewrites a module from an edited form row.
#[must_use]
pub fn patch_from_change(change: &ModuleChange) -> ModulePatch {
    ModulePatch {
        title: Some(change.module.title.clone()),
        lessons: Some(change.module.lessons),
        hours: Some(change.module.hours),
        minutes: Some(change.module.minutes),
        completed: Some(change.module.completed),
    }
}

#[derive(Default)]
struct MemoryState {
    courses: BTreeMap<CourseId, Course>,
    goal: Option<StudyGoal>,
    last_course_id: u64,
    last_module_id: u64,
}

impl MemoryState {
    fn next_module_id(&mut self) -> ModuleId {
        self.last_module_id += 1;
        ModuleId::new(self.last_module_id)
    }

    fn reconcile(
        &mut self,
        course: &Course,
        changes: &[ModuleChange],
        at: DateTime<Utc>,
    ) -> Result<Vec<Module>, StorageError> {
        for change in changes {
            if let Some(id) = change.id {
                if course.module(id).is_none() {
                    return Err(StorageError::NotFound);
                }
            }
        }

        let mut modules: Vec<Module> = course
            .modules()
            .iter()
            .filter_map(|existing| {
                changes
                    .iter()
                    .find(|change| change.id == Some(existing.id()))
                    .map(|change| existing.patched(&patch_from_change(change), at))
            })
            .collect();

        for change in changes.iter().filter(|change| change.id.is_none()) {
            let id = self.next_module_id();
            modules.push(change.module.clone().assign_id(id, at));
        }
        Ok(modules)
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        let guard = self.lock()?;
        let mut courses: Vec<Course> = guard.courses.values().cloned().collect();
        courses.sort_by_key(Course::created_at);
        Ok(courses)
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let guard = self.lock()?;
        guard.courses.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn create_course(
        &self,
        course: NewCourse,
        created_at: DateTime<Utc>,
    ) -> Result<Course, StorageError> {
        let mut guard = self.lock()?;
        guard.last_course_id += 1;
        let id = CourseId::new(guard.last_course_id);

        let mut modules = Vec::with_capacity(course.modules.len());
        for module in course.modules {
            let module_id = guard.next_module_id();
            modules.push(module.assign_id(module_id, created_at));
        }

        let stored = Course::from_persisted(id, course.title, created_at, modules, None);
        guard.courses.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_course(
        &self,
        id: CourseId,
        update: &CourseUpdate,
        at: DateTime<Utc>,
    ) -> Result<Course, StorageError> {
        let mut guard = self.lock()?;
        let current = guard.courses.get(&id).cloned().ok_or(StorageError::NotFound)?;
        let patched = current.patched(&update.patch);

        let updated = match &update.modules {
            Some(changes) => {
                let modules = guard.reconcile(&patched, changes, at)?;
                Course::from_persisted(
                    patched.id(),
                    patched.title(),
                    patched.created_at(),
                    modules,
                    patched.certificate().cloned(),
                )
            }
            None => patched,
        };
        guard.courses.insert(id, updated.clone());
        Ok(updated)
    }

    async fn update_module(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        patch: &ModulePatch,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let course = guard.courses.get(&course_id).ok_or(StorageError::NotFound)?;
        let patched = course
            .with_module_patched(module_id, patch, at)
            .ok_or(StorageError::NotFound)?;
        guard.courses.insert(course_id, patched);
        Ok(())
    }

    async fn delete_course(&self, id: CourseId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .courses
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn toggle_module_completion(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let course = guard.courses.get(&course_id).ok_or(StorageError::NotFound)?;
        let toggled = course
            .with_module_toggled(module_id, at)
            .ok_or(StorageError::NotFound)?;
        guard.courses.insert(course_id, toggled);
        Ok(())
    }
}

#[async_trait]
impl GoalRepository for InMemoryRepository {
    async fn get_goal(&self) -> Result<Option<StudyGoal>, StorageError> {
        Ok(self.lock()?.goal)
    }

    async fn upsert_goal(&self, goal: &StudyGoal) -> Result<StudyGoal, StorageError> {
        let mut guard = self.lock()?;
        guard.goal = Some(*goal);
        Ok(*goal)
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub goals: Arc<dyn GoalRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let courses: Arc<dyn CourseRepository> = Arc::new(repo.clone());
        let goals: Arc<dyn GoalRepository> = Arc::new(repo);
        Self { courses, goals }
    }
}
