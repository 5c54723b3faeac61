//! Progress aggregation over courses and modules.
//!
//! Everything here is a pure function of its input: no clock, no I/O.
//! Durations are whole minutes.

use serde::Serialize;

use crate::model::{Course, Module};

/// Duration of one module in minutes.
#[must_use]
pub fn module_minutes(module: &Module) -> u64 {
    u64::from(module.hours()) * 60 + u64::from(module.minutes())
}

/// Sum of every module's duration; 0 for a course with no modules.
#[must_use]
pub fn course_total_minutes(course: &Course) -> u64 {
    course.modules().iter().map(module_minutes).sum()
}

/// Sum of the durations of completed modules.
#[must_use]
pub fn course_completed_minutes(course: &Course) -> u64 {
    course
        .modules()
        .iter()
        .filter(|m| m.completed())
        .map(module_minutes)
        .sum()
}

/// Minutes left across incomplete modules.
#[must_use]
pub fn course_remaining_minutes(course: &Course) -> u64 {
    course
        .modules()
        .iter()
        .filter(|m| !m.completed())
        .map(module_minutes)
        .sum()
}

/// Percentage of the course's duration marked complete, in `0..=100`.
///
/// A course with zero total minutes reports 0.
#[must_use]
pub fn course_progress(course: &Course) -> u8 {
    percent(course_completed_minutes(course), course_total_minutes(course))
}

/// `round(100 * part / whole)` with halves rounded up; 0 when `whole` is 0.
#[must_use]
pub fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = u128::from(part.min(whole));
    let whole = u128::from(whole);
    let rounded = (200 * part + whole) / (2 * whole);
    u8::try_from(rounded).unwrap_or(100)
}

/// Portfolio-wide totals shown on the overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PortfolioProgress {
    pub total_courses: usize,
    /// Courses with at least one module where every module is complete.
    pub completed_courses: usize,
    pub total_minutes: u64,
    pub completed_minutes: u64,
    pub overall_progress: u8,
    pub total_modules: usize,
    pub completed_modules: usize,
    pub total_lessons: u64,
}

#[must_use]
pub fn portfolio_progress(courses: &[Course]) -> PortfolioProgress {
    let mut summary = courses
        .iter()
        .fold(PortfolioProgress::default(), |mut acc, course| {
            acc.total_courses += 1;
            if course.is_complete() {
                acc.completed_courses += 1;
            }
            acc.total_minutes += course_total_minutes(course);
            acc.completed_minutes += course_completed_minutes(course);
            acc.total_modules += course.modules().len();
            acc.completed_modules += course.modules().iter().filter(|m| m.completed()).count();
            acc.total_lessons += course.total_lessons();
            acc
        });
    summary.overall_progress = percent(summary.completed_minutes, summary.total_minutes);
    summary
}

/// Render minutes as `"2h 30min"`, `"3h"`, `"45min"` or `"0min"`.
#[must_use]
pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    match (hours, rest) {
        (0, rest) => format!("{rest}min"),
        (hours, 0) => format!("{hours}h"),
        (hours, rest) => format!("{hours}h {rest}min"),
    }
}
