use std::sync::Arc;

use storage::repository::GoalRepository;
use study_core::model::{StudyGoal, StudyGoalDraft};
use tracing::{info, warn};

use crate::cache::{CacheKey, QueryCache};
use crate::error::GoalServiceError;
use crate::notices::{Notice, Notifications};

/// Reads and saves the single daily study goal.
#[derive(Clone)]
pub struct GoalService {
    goals: Arc<dyn GoalRepository>,
    cache: Arc<QueryCache>,
    notices: Arc<Notifications>,
}

impl GoalService {
    #[must_use]
    pub fn new(goals: Arc<dyn GoalRepository>) -> Self {
        Self::with_shared(
            goals,
            Arc::new(QueryCache::new()),
            Arc::new(Notifications::new()),
        )
    }

    #[must_use]
    pub fn with_shared(
        goals: Arc<dyn GoalRepository>,
        cache: Arc<QueryCache>,
        notices: Arc<Notifications>,
    ) -> Self {
        Self {
            goals,
            cache,
            notices,
        }
    }

    /// The saved goal, or `None` if none was ever saved.
    ///
    /// # Errors
    ///
    /// Returns `GoalServiceError::Storage` if the store cannot be read.
    pub async fn load(&self) -> Result<Option<StudyGoal>, GoalServiceError> {
        if let Some(cached) = self.cache.goal() {
            return Ok(cached);
        }
        let goal = self.goals.get_goal().await?;
        self.cache.put_goal(goal);
        Ok(goal)
    }

    /// Validate and store the goal, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `GoalServiceError::Validation` if `daily_hours` is negative or
    /// not a number.
    /// Returns `GoalServiceError::Storage` if persistence fails.
    pub async fn save(&self, draft: StudyGoalDraft) -> Result<StudyGoal, GoalServiceError> {
        let goal = draft.validate()?;
        self.cache.invalidate(CacheKey::Goal);
        match self.goals.upsert_goal(&goal).await {
            Ok(saved) => {
                info!(
                    daily_hours = saved.daily_hours(),
                    consider_weekends = saved.consider_weekends(),
                    "study goal saved"
                );
                self.cache.put_goal(Some(saved));
                self.notices.push(Notice::success("Goal saved"));
                Ok(saved)
            }
            Err(err) => {
                warn!(error = %err, "could not save study goal");
                self.notices
                    .push(Notice::error("Could not save goal", err.to_string()));
                Err(err.into())
            }
        }
    }
}
