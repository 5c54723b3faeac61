use async_trait::async_trait;
use sqlx::Row;
use study_core::model::StudyGoal;

use super::SqliteRepository;
use super::mapping::{bool_to_i64, conn, ser};
use crate::repository::{GoalRepository, StorageError};

#[async_trait]
impl GoalRepository for SqliteRepository {
    async fn get_goal(&self) -> Result<Option<StudyGoal>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT daily_hours, consider_weekends
            FROM study_goal
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let daily_hours: f64 = row.try_get("daily_hours").map_err(ser)?;
        let consider_weekends = row.try_get::<i64, _>("consider_weekends").map_err(ser)? != 0;
        Ok(Some(StudyGoal::from_persisted(daily_hours, consider_weekends)))
    }

    async fn upsert_goal(&self, goal: &StudyGoal) -> Result<StudyGoal, StorageError> {
        sqlx::query(
            r"
            INSERT INTO study_goal (id, daily_hours, consider_weekends)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                daily_hours = excluded.daily_hours,
                consider_weekends = excluded.consider_weekends
            ",
        )
        .bind(1_i64)
        .bind(goal.daily_hours())
        .bind(bool_to_i64(goal.consider_weekends()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(*goal)
    }
}
