use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::cache::QueryCache;
use crate::course_service::CourseService;
use crate::error::AppServicesError;
use crate::goal_service::GoalService;
use crate::notices::{Notice, Notifications};

/// Assembles app-facing services over one store, sharing a cache and a
/// notice inbox between them.
#[derive(Clone)]
pub struct AppServices {
    courses: Arc<CourseService>,
    goals: Arc<GoalService>,
    notices: Arc<Notifications>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over a fresh in-memory store.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let cache = Arc::new(QueryCache::new());
        let notices = Arc::new(Notifications::new());
        let courses = Arc::new(CourseService::with_shared(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&cache),
            Arc::clone(&notices),
        ));
        let goals = Arc::new(GoalService::with_shared(
            Arc::clone(&storage.goals),
            cache,
            Arc::clone(&notices),
        ));
        Self {
            courses,
            goals,
            notices,
        }
    }

    #[must_use]
    pub fn courses(&self) -> Arc<CourseService> {
        Arc::clone(&self.courses)
    }

    #[must_use]
    pub fn goals(&self) -> Arc<GoalService> {
        Arc::clone(&self.goals)
    }

    /// Drain notices from every service, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        self.notices.take()
    }
}
