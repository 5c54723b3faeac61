//! Read cache for store queries.
//!
//! Mutations invalidate the keys they touch; the next read goes back to the
//! record store. Invalidating [`CacheKey::Courses`] also drops every
//! [`CacheKey::Course`] entry, since a single course is part of the list.

use std::collections::HashMap;

use parking_lot::Mutex;
use study_core::model::{Course, CourseId, StudyGoal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Courses,
    Course(CourseId),
    Goal,
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Courses(Vec<Course>),
    Course(Course),
    Goal(Option<StudyGoal>),
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn courses(&self) -> Option<Vec<Course>> {
        match self.entries.lock().get(&CacheKey::Courses) {
            Some(CacheEntry::Courses(courses)) => Some(courses.clone()),
            _ => None,
        }
    }

    pub fn put_courses(&self, courses: Vec<Course>) {
        self.entries
            .lock()
            .insert(CacheKey::Courses, CacheEntry::Courses(courses));
    }

    #[must_use]
    pub fn course(&self, id: CourseId) -> Option<Course> {
        match self.entries.lock().get(&CacheKey::Course(id)) {
            Some(CacheEntry::Course(course)) => Some(course.clone()),
            _ => None,
        }
    }

    pub fn put_course(&self, course: Course) {
        self.entries
            .lock()
            .insert(CacheKey::Course(course.id()), CacheEntry::Course(course));
    }

    /// `Some(None)` means the store was asked and has no goal.
    #[must_use]
    pub fn goal(&self) -> Option<Option<StudyGoal>> {
        match self.entries.lock().get(&CacheKey::Goal) {
            Some(CacheEntry::Goal(goal)) => Some(*goal),
            _ => None,
        }
    }

    pub fn put_goal(&self, goal: Option<StudyGoal>) {
        self.entries.lock().insert(CacheKey::Goal, CacheEntry::Goal(goal));
    }

    #[must_use]
    pub fn contains(&self, key: CacheKey) -> bool {
        self.entries.lock().contains_key(&key)
    }

    pub fn invalidate(&self, key: CacheKey) {
        let mut entries = self.entries.lock();
        match key {
            CacheKey::Courses => {
                entries.retain(|k, _| !matches!(k, CacheKey::Courses | CacheKey::Course(_)));
            }
            key => {
                entries.remove(&key);
            }
        }
    }
}
