//! Completion projections from remaining time and the daily goal.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::model::{Course, CourseId, StudyGoal};
use crate::progress::course_remaining_minutes;

/// Daily study capacity assumed when there is no goal or the goal is zero hours.
///
/// Projections never divide by zero: without a usable goal every course is
/// projected at one hour per day.
pub const FALLBACK_DAILY_MINUTES: u64 = 60;

/// Derived estimate for one course. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CourseInsight {
    pub course_id: CourseId,
    pub remaining_minutes: u64,
    pub estimated_days: u64,
    pub estimated_completion_date: NaiveDate,
}

/// Whole minutes of study per day the projection assumes; at least 1.
#[must_use]
pub fn daily_capacity_minutes(goal: Option<&StudyGoal>) -> u64 {
    goal.and_then(StudyGoal::daily_minutes)
        .unwrap_or(FALLBACK_DAILY_MINUTES)
}

/// Project when `course` will be finished studying `goal` per day from `today`.
///
/// `estimated_days` is `ceil(remaining / capacity)` and is 0 when nothing is
/// left, in which case the date is `today`.
#[must_use]
pub fn estimate_completion(
    course: &Course,
    goal: Option<&StudyGoal>,
    today: NaiveDate,
) -> CourseInsight {
    let remaining_minutes = course_remaining_minutes(course);
    let estimated_days = remaining_minutes.div_ceil(daily_capacity_minutes(goal));
    let estimated_completion_date = today
        .checked_add_days(Days::new(estimated_days))
        .unwrap_or(NaiveDate::MAX);

    CourseInsight {
        course_id: course.id(),
        remaining_minutes,
        estimated_days,
        estimated_completion_date,
    }
}

/// Insights for every course still in progress, soonest completion first.
///
/// Complete courses (at least one module, all done) are left out. Courses
/// with no modules stay in with zero remaining time. Ties keep creation order.
#[must_use]
pub fn course_insights(
    courses: &[Course],
    goal: Option<&StudyGoal>,
    today: NaiveDate,
) -> Vec<CourseInsight> {
    let mut active: Vec<(&Course, CourseInsight)> = courses
        .iter()
        .filter(|course| !course.is_complete())
        .map(|course| (course, estimate_completion(course, goal, today)))
        .collect();

    // stable: equal keys keep input order
    active.sort_by_key(|(course, insight)| (insight.estimated_days, course.created_at()));
    active.into_iter().map(|(_, insight)| insight).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModuleId, NewModule};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn course_at(id: u64, offset_secs: i64, modules: &[(u32, u32, bool)]) -> Course {
        let modules = modules
            .iter()
            .enumerate()
            .map(|(idx, (hours, minutes, completed))| {
                NewModule {
                    title: format!("m{idx}"),
                    lessons: 1,
                    hours: *hours,
                    minutes: *minutes,
                    completed: *completed,
                }
                .assign_id(ModuleId::new(idx as u64), fixed_now())
            })
            .collect();
        Course::from_persisted(
            CourseId::new(id),
            format!("c{id}"),
            fixed_now() + Duration::seconds(offset_secs),
            modules,
            None,
        )
    }

    #[test]
    fn two_hour_goal_needs_three_days_for_five_hours() {
        let goal = StudyGoal::from_persisted(2.0, false);
        let course = course_at(1, 0, &[(5, 0, false)]);

        let insight = estimate_completion(&course, Some(&goal), today());
        assert_eq!(insight.remaining_minutes, 300);
        assert_eq!(insight.estimated_days, 3);
        assert_eq!(
            insight.estimated_completion_date,
            NaiveDate::from_ymd_opt(2024, 3, 13).unwrap()
        );
    }

    #[test]
    fn nothing_remaining_finishes_today() {
        let goal = StudyGoal::from_persisted(0.5, true);
        for course in [course_at(1, 0, &[]), course_at(2, 0, &[(1, 0, true)])] {
            let insight = estimate_completion(&course, Some(&goal), today());
            assert_eq!(insight.estimated_days, 0);
            assert_eq!(insight.estimated_completion_date, today());
        }
    }

    #[test]
    fn missing_or_zero_goal_falls_back_to_an_hour_a_day() {
        let course = course_at(1, 0, &[(2, 30, false)]);
        let zero = StudyGoal::from_persisted(0.0, false);

        assert_eq!(estimate_completion(&course, None, today()).estimated_days, 3);
        assert_eq!(estimate_completion(&course, Some(&zero), today()).estimated_days, 3);
        assert_eq!(daily_capacity_minutes(None), 60);
    }

    #[test]
    fn decimal_goal_covering_exactly_one_day_takes_one_day() {
        // 4.1 h is 246 min; 4.1 * 60.0 in f64 is just below that
        let goal = StudyGoal::from_persisted(4.1, false);
        let course = course_at(1, 0, &[(4, 6, false)]);

        let insight = estimate_completion(&course, Some(&goal), today());
        assert_eq!(insight.remaining_minutes, 246);
        assert_eq!(insight.estimated_days, 1);

        let longer = course_at(2, 0, &[(4, 7, false)]);
        assert_eq!(estimate_completion(&longer, Some(&goal), today()).estimated_days, 2);
    }

    #[test]
    fn weekends_flag_does_not_change_estimate() {
        let course = course_at(1, 0, &[(10, 0, false)]);
        let weekdays = StudyGoal::from_persisted(1.0, false);
        let weekends = StudyGoal::from_persisted(1.0, true);
        assert_eq!(
            estimate_completion(&course, Some(&weekdays), today()),
            estimate_completion(&course, Some(&weekends), today())
        );
    }

    #[test]
    fn insights_skip_complete_courses_but_keep_empty_ones() {
        let done = course_at(1, 0, &[(1, 0, true)]);
        let empty = course_at(2, 1, &[]);
        let active = course_at(3, 2, &[(1, 0, false)]);

        let ids: Vec<_> = course_insights(&[done, empty, active], None, today())
            .into_iter()
            .map(|i| i.course_id)
            .collect();
        assert_eq!(ids, [CourseId::new(2), CourseId::new(3)]);
    }

    #[test]
    fn insights_sort_by_days_then_creation_order() {
        let long = course_at(1, 0, &[(5, 0, false)]);
        let short_late = course_at(2, 20, &[(0, 30, false)]);
        let short_early = course_at(3, 10, &[(0, 45, false)]);

        let ids: Vec<_> = course_insights(&[long, short_late, short_early], None, today())
            .into_iter()
            .map(|i| i.course_id)
            .collect();
        assert_eq!(ids, [CourseId::new(3), CourseId::new(2), CourseId::new(1)]);
    }
}
