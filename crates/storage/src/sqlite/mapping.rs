use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use study_core::model::{Certificate, Course, CourseId, Module, ModuleId};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn module_id_from_i64(v: i64) -> Result<ModuleId, StorageError> {
    Ok(ModuleId::new(i64_to_u64("module_id", v)?))
}

pub(crate) fn course_id_to_i64(id: CourseId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("course_id overflow".into()))
}

pub(crate) fn module_id_to_i64(id: ModuleId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("module_id overflow".into()))
}

pub(crate) fn bool_to_i64(value: bool) -> i64 {
    i64::from(value)
}

/// Maps a `modules` row. The completion flag and timestamp must agree.
pub(crate) fn map_module_row(row: &SqliteRow) -> Result<Module, StorageError> {
    let completed = row.try_get::<i64, _>("completed").map_err(ser)? != 0;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
    if completed != completed_at.is_some() {
        return Err(StorageError::Serialization(
            "completion flag and completed_at disagree".into(),
        ));
    }

    Ok(Module::from_persisted(
        module_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        i64_to_u32("lessons", row.try_get::<i64, _>("lessons").map_err(ser)?)?,
        i64_to_u32("hours", row.try_get::<i64, _>("hours").map_err(ser)?)?,
        i64_to_u32("minutes", row.try_get::<i64, _>("minutes").map_err(ser)?)?,
        completed_at,
    ))
}

/// Maps a `courses` row; `modules` must already be in creation order.
pub(crate) fn map_course_row(
    row: &SqliteRow,
    modules: Vec<Module>,
) -> Result<Course, StorageError> {
    let certificate_url: Option<String> = row.try_get("certificate_url").map_err(ser)?;
    let issued_at: Option<NaiveDate> = row.try_get("certificate_issued_at").map_err(ser)?;

    Ok(Course::from_persisted(
        course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        modules,
        certificate_url.map(|url| Certificate::from_persisted(url, issued_at)),
    ))
}
