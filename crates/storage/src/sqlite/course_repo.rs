use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use study_core::model::{
    Course, CourseId, CourseUpdate, ModuleChange, ModuleId, ModulePatch, NewCourse, NewModule,
};

use super::SqliteRepository;
use super::mapping::{
    bool_to_i64, conn, course_id_to_i64, map_course_row, map_module_row, module_id_to_i64, ser,
};
use crate::repository::{CourseRepository, StorageError};

const MODULE_COLUMNS: &str =
    "id, course_id, title, lessons, hours, minutes, completed, completed_at";

async fn insert_module(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: i64,
    module: &NewModule,
    created_at: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO modules (course_id, title, lessons, hours, minutes, completed, completed_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
    )
    .bind(course_id)
    .bind(&module.title)
    .bind(i64::from(module.lessons))
    .bind(i64::from(module.hours))
    .bind(i64::from(module.minutes))
    .bind(bool_to_i64(module.completed))
    .bind(module.completed.then_some(created_at))
    .bind(created_at)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;
    Ok(())
}

/// Rewrite an existing module. `completed_at` is kept when completion does
/// not change, stamped with `at` when it turns on, cleared when it turns off.
async fn rewrite_module(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: i64,
    module_id: ModuleId,
    module: &NewModule,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    let res = sqlx::query(
        r"
        UPDATE modules SET
            title = ?3,
            lessons = ?4,
            hours = ?5,
            minutes = ?6,
            completed_at = CASE
                WHEN ?7 = 0 THEN NULL
                WHEN completed = 1 THEN completed_at
                ELSE ?8
            END,
            completed = ?7
        WHERE id = ?1 AND course_id = ?2
        ",
    )
    .bind(module_id_to_i64(module_id)?)
    .bind(course_id)
    .bind(&module.title)
    .bind(i64::from(module.lessons))
    .bind(i64::from(module.hours))
    .bind(i64::from(module.minutes))
    .bind(bool_to_i64(module.completed))
    .bind(at)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    if res.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

async fn fetch_course(db: &mut SqliteConnection, course_id: i64) -> Result<Course, StorageError> {
    let row = sqlx::query(
        r"
        SELECT id, title, created_at, certificate_url, certificate_issued_at
        FROM courses WHERE id = ?1
        ",
    )
    .bind(course_id)
    .fetch_optional(&mut *db)
    .await
    .map_err(conn)?
    .ok_or(StorageError::NotFound)?;

    let module_rows = sqlx::query(&format!(
        "SELECT {MODULE_COLUMNS} FROM modules WHERE course_id = ?1 ORDER BY id ASC"
    ))
    .bind(course_id)
    .fetch_all(&mut *db)
    .await
    .map_err(conn)?;

    let modules = module_rows
        .iter()
        .map(map_module_row)
        .collect::<Result<Vec<_>, _>>()?;
    map_course_row(&row, modules)
}

async fn reconcile_modules(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: i64,
    changes: &[ModuleChange],
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    let existing: Vec<i64> = sqlx::query("SELECT id FROM modules WHERE course_id = ?1")
        .bind(course_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(conn)?
        .iter()
        .map(|row| row.try_get::<i64, _>("id").map_err(ser))
        .collect::<Result<_, _>>()?;

    let mut kept = Vec::with_capacity(changes.len());
    for change in changes {
        match change.id {
            Some(id) => {
                rewrite_module(tx, course_id, id, &change.module, at).await?;
                kept.push(module_id_to_i64(id)?);
            }
            None => insert_module(tx, course_id, &change.module, at).await?,
        }
    }

    for id in existing.into_iter().filter(|id| !kept.contains(id)) {
        sqlx::query("DELETE FROM modules WHERE id = ?1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(conn)?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn list_courses(&self) -> Result<Vec<Course>, StorageError> {
        let course_rows = sqlx::query(
            r"
            SELECT id, title, created_at, certificate_url, certificate_issued_at
            FROM courses
            ORDER BY created_at ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let module_rows = sqlx::query(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules ORDER BY course_id ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut modules_by_course: HashMap<i64, Vec<_>> = HashMap::new();
        for row in &module_rows {
            let course_id: i64 = row.try_get("course_id").map_err(ser)?;
            modules_by_course
                .entry(course_id)
                .or_default()
                .push(map_module_row(row)?);
        }

        let mut courses = Vec::with_capacity(course_rows.len());
        for row in &course_rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let modules = modules_by_course.remove(&id).unwrap_or_default();
            courses.push(map_course_row(row, modules)?);
        }
        Ok(courses)
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        fetch_course(&mut db, course_id_to_i64(id)?).await
    }

    async fn create_course(
        &self,
        course: NewCourse,
        created_at: DateTime<Utc>,
    ) -> Result<Course, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query("INSERT INTO courses (title, created_at) VALUES (?1, ?2)")
            .bind(&course.title)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        let course_id = res.last_insert_rowid();

        for module in &course.modules {
            insert_module(&mut tx, course_id, module, created_at).await?;
        }
        let stored = fetch_course(&mut tx, course_id).await?;
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn update_course(
        &self,
        id: CourseId,
        update: &CourseUpdate,
        at: DateTime<Utc>,
    ) -> Result<Course, StorageError> {
        let course_id = course_id_to_i64(id)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let exists = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        if let Some(title) = &update.patch.title {
            sqlx::query("UPDATE courses SET title = ?2 WHERE id = ?1")
                .bind(course_id)
                .bind(title)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }

        if let Some(certificate) = &update.patch.certificate {
            sqlx::query(
                r"
                UPDATE courses SET certificate_url = ?2, certificate_issued_at = ?3
                WHERE id = ?1
                ",
            )
            .bind(course_id)
            .bind(certificate.as_ref().map(|c| c.url().to_owned()))
            .bind(certificate.as_ref().and_then(|c| c.issued_at()))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        if let Some(changes) = &update.modules {
            reconcile_modules(&mut tx, course_id, changes, at).await?;
        }

        let stored = fetch_course(&mut tx, course_id).await?;
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn update_module(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        patch: &ModulePatch,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        // NULL parameters keep the stored column.
        let res = sqlx::query(
            r"
            UPDATE modules SET
                title = COALESCE(?3, title),
                lessons = COALESCE(?4, lessons),
                hours = COALESCE(?5, hours),
                minutes = COALESCE(?6, minutes),
                completed_at = CASE
                    WHEN ?7 IS NULL THEN completed_at
                    WHEN ?7 = 0 THEN NULL
                    WHEN completed = 1 THEN completed_at
                    ELSE ?8
                END,
                completed = COALESCE(?7, completed)
            WHERE id = ?1 AND course_id = ?2
            ",
        )
        .bind(module_id_to_i64(module_id)?)
        .bind(course_id_to_i64(course_id)?)
        .bind(patch.title.as_deref())
        .bind(patch.lessons.map(i64::from))
        .bind(patch.hours.map(i64::from))
        .bind(patch.minutes.map(i64::from))
        .bind(patch.completed.map(bool_to_i64))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_course(&self, id: CourseId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM courses WHERE id = ?1")
            .bind(course_id_to_i64(id)?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn toggle_module_completion(
        &self,
        course_id: CourseId,
        module_id: ModuleId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        // SET expressions read the pre-update row.
        let res = sqlx::query(
            r"
            UPDATE modules SET
                completed = 1 - completed,
                completed_at = CASE WHEN completed = 1 THEN NULL ELSE ?3 END
            WHERE id = ?1 AND course_id = ?2
            ",
        )
        .bind(module_id_to_i64(module_id)?)
        .bind(course_id_to_i64(course_id)?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
