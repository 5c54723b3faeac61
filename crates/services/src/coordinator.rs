//! Optimistic mutation coordinator.
//!
//! Holds the locally displayed course list. A mutation is applied to it
//! immediately, before the record store has answered, and the state it
//! replaced is kept as a rollback snapshot. Each mutation then settles
//! exactly once:
//!
//! - `confirm`: the local list is replaced by the authoritative list the
//!   store returned after the write.
//! - `rollback`: the snapshot is restored verbatim and one error notice is
//!   published.
//!
//! A mutation begun while another is in flight snapshots the current,
//! possibly optimistic, list. Rollbacks are not stacked: whichever mutation
//! settles last decides the local list.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use study_core::model::{Course, CourseId, CoursePatch, ModuleId, ModulePatch};
use thiserror::Error;
use tracing::debug;

use crate::notices::{Notice, Notifications};

/// A change that can be previewed locally before the store confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMutation {
    ToggleModule {
        course_id: CourseId,
        module_id: ModuleId,
    },
    PatchCourse {
        course_id: CourseId,
        patch: CoursePatch,
    },
    PatchModule {
        course_id: CourseId,
        module_id: ModuleId,
        patch: ModulePatch,
    },
    RemoveCourse {
        course_id: CourseId,
    },
}

impl LocalMutation {
    #[must_use]
    pub fn course_id(&self) -> CourseId {
        match self {
            Self::ToggleModule { course_id, .. }
            | Self::PatchCourse { course_id, .. }
            | Self::PatchModule { course_id, .. }
            | Self::RemoveCourse { course_id } => *course_id,
        }
    }

    fn success_title(&self) -> &'static str {
        match self {
            Self::ToggleModule { .. } | Self::PatchModule { .. } => "Module updated",
            Self::PatchCourse { .. } => "Course updated",
            Self::RemoveCourse { .. } => "Course removed",
        }
    }

    fn failure_title(&self) -> &'static str {
        match self {
            Self::ToggleModule { .. } | Self::PatchModule { .. } => "Could not update module",
            Self::PatchCourse { .. } => "Could not update course",
            Self::RemoveCourse { .. } => "Could not remove course",
        }
    }

    /// Compute the optimistic list. `courses` is left untouched.
    fn apply(&self, courses: &[Course], at: DateTime<Utc>) -> Result<Vec<Course>, MutationError> {
        let course_id = self.course_id();
        let index = courses
            .iter()
            .position(|course| course.id() == course_id)
            .ok_or(MutationError::CourseNotFound(course_id))?;

        let mut next = courses.to_vec();
        match self {
            Self::ToggleModule { module_id, .. } => {
                next[index] = courses[index]
                    .with_module_toggled(*module_id, at)
                    .ok_or(MutationError::ModuleNotFound {
                        course_id,
                        module_id: *module_id,
                    })?;
            }
            Self::PatchModule {
                module_id, patch, ..
            } => {
                next[index] = courses[index]
                    .with_module_patched(*module_id, patch, at)
                    .ok_or(MutationError::ModuleNotFound {
                        course_id,
                        module_id: *module_id,
                    })?;
            }
            Self::PatchCourse { patch, .. } => {
                next[index] = courses[index].patched(patch);
            }
            Self::RemoveCourse { .. } => {
                next.remove(index);
            }
        }
        Ok(next)
    }
}

/// Handle for one in-flight mutation, returned by [`MutationCoordinator::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationTicket(u64);

impl fmt::Display for MutationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a single mutation.
///
/// `Idle -> OptimisticApplied -> Idle` on confirm,
/// `Idle -> OptimisticApplied -> RolledBack -> Idle` on failure.
/// `RolledBack` is the transition reported by [`MutationCoordinator::rollback`];
/// afterwards the ticket reads as `Idle` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    OptimisticApplied,
    RolledBack,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MutationError {
    #[error("course {0} is not loaded")]
    CourseNotFound(CourseId),
    #[error("module {module_id} is not part of course {course_id}")]
    ModuleNotFound {
        course_id: CourseId,
        module_id: ModuleId,
    },
    #[error("mutation {0} is not in flight")]
    UnknownTicket(MutationTicket),
}

#[derive(Debug)]
struct InFlight {
    mutation: LocalMutation,
    snapshot: Vec<Course>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    courses: Vec<Course>,
    synced: bool,
    in_flight: HashMap<MutationTicket, InFlight>,
    last_ticket: u64,
}

/// Owner of the local course list and every in-flight optimistic mutation.
///
/// All methods are synchronous; callers await the record store between
/// [`begin`](Self::begin) and [`confirm`](Self::confirm) or
/// [`rollback`](Self::rollback), never while holding the lock.
#[derive(Debug)]
pub struct MutationCoordinator {
    state: Mutex<CoordinatorState>,
    notices: Arc<Notifications>,
}

impl MutationCoordinator {
    #[must_use]
    pub fn new(notices: Arc<Notifications>) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            notices,
        }
    }

    /// Current local list, optimistic patches included.
    #[must_use]
    pub fn courses(&self) -> Vec<Course> {
        self.state.lock().courses.clone()
    }

    #[must_use]
    pub fn course(&self, id: CourseId) -> Option<Course> {
        self.state
            .lock()
            .courses
            .iter()
            .find(|course| course.id() == id)
            .cloned()
    }

    /// True once an authoritative list has been loaded.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.state.lock().synced
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    #[must_use]
    pub fn phase(&self, ticket: MutationTicket) -> MutationPhase {
        if self.state.lock().in_flight.contains_key(&ticket) {
            MutationPhase::OptimisticApplied
        } else {
            MutationPhase::Idle
        }
    }

    /// Adopt an authoritative list read from the store.
    ///
    /// Ignored while mutations are in flight so their optimistic patches stay
    /// visible; their own settlement brings the list up to date. Returns
    /// whether the list was adopted.
    pub fn sync(&self, courses: Vec<Course>) -> bool {
        let mut state = self.state.lock();
        if !state.in_flight.is_empty() {
            debug!(in_flight = state.in_flight.len(), "sync deferred");
            return false;
        }
        state.courses = courses;
        state.synced = true;
        true
    }

    /// Apply `mutation` to the local list and remember the prior list.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::CourseNotFound` or `MutationError::ModuleNotFound`
    /// when the target is not in the local list; nothing changes in that case.
    pub fn begin(
        &self,
        mutation: LocalMutation,
        at: DateTime<Utc>,
    ) -> Result<MutationTicket, MutationError> {
        let mut state = self.state.lock();
        let next = mutation.apply(&state.courses, at)?;
        let snapshot = std::mem::replace(&mut state.courses, next);

        state.last_ticket += 1;
        let ticket = MutationTicket(state.last_ticket);
        debug!(%ticket, course_id = %mutation.course_id(), "optimistic mutation applied");
        state.in_flight.insert(ticket, InFlight { mutation, snapshot });
        Ok(ticket)
    }

    /// Settle a successful mutation with the list the store now holds.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::UnknownTicket` if `ticket` already settled.
    pub fn confirm(
        &self,
        ticket: MutationTicket,
        server_courses: Vec<Course>,
    ) -> Result<MutationPhase, MutationError> {
        let settled = {
            let mut state = self.state.lock();
            let settled = state
                .in_flight
                .remove(&ticket)
                .ok_or(MutationError::UnknownTicket(ticket))?;
            state.courses = server_courses;
            state.synced = true;
            settled
        };
        debug!(%ticket, "mutation confirmed");
        self.notices
            .push(Notice::success(settled.mutation.success_title()));
        Ok(MutationPhase::Idle)
    }

    /// Restore the list captured by `begin` and publish one error notice.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::UnknownTicket` if `ticket` already settled.
    pub fn rollback(
        &self,
        ticket: MutationTicket,
        reason: &str,
    ) -> Result<MutationPhase, MutationError> {
        let settled = {
            let mut state = self.state.lock();
            let settled = state
                .in_flight
                .remove(&ticket)
                .ok_or(MutationError::UnknownTicket(ticket))?;
            state.courses = settled.snapshot.clone();
            settled
        };
        debug!(%ticket, reason, "mutation rolled back");
        self.notices
            .push(Notice::error(settled.mutation.failure_title(), reason));
        Ok(MutationPhase::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::model::{Certificate, NewModule};
    use study_core::time::fixed_now;

    fn course(id: u64, modules: &[(u64, bool)]) -> Course {
        let modules = modules
            .iter()
            .map(|(module_id, completed)| {
                NewModule {
                    title: format!("m{module_id}"),
                    lessons: 2,
                    hours: 1,
                    minutes: 0,
                    completed: *completed,
                }
                .assign_id(ModuleId::new(*module_id), fixed_now())
            })
            .collect();
        Course::from_persisted(CourseId::new(id), format!("c{id}"), fixed_now(), modules, None)
    }

    fn coordinator(courses: Vec<Course>) -> (MutationCoordinator, Arc<Notifications>) {
        let notices = Arc::new(Notifications::new());
        let coordinator = MutationCoordinator::new(Arc::clone(&notices));
        assert!(coordinator.sync(courses));
        (coordinator, notices)
    }

    fn toggle(course_id: u64, module_id: u64) -> LocalMutation {
        LocalMutation::ToggleModule {
            course_id: CourseId::new(course_id),
            module_id: ModuleId::new(module_id),
        }
    }

    #[test]
    fn begin_applies_toggle_locally() {
        let (coordinator, _) = coordinator(vec![course(1, &[(10, false)])]);

        let ticket = coordinator.begin(toggle(1, 10), fixed_now()).unwrap();

        assert_eq!(coordinator.phase(ticket), MutationPhase::OptimisticApplied);
        let local = coordinator.course(CourseId::new(1)).unwrap();
        assert!(local.modules()[0].completed());
        assert_eq!(local.modules()[0].completed_at(), Some(fixed_now()));
    }

    #[test]
    fn rollback_restores_exact_snapshot_and_reports_once() {
        let before = vec![course(1, &[(10, false), (11, true)]), course(2, &[])];
        let (coordinator, notices) = coordinator(before.clone());

        let ticket = coordinator.begin(toggle(1, 10), fixed_now()).unwrap();
        assert_ne!(coordinator.courses(), before);

        let phase = coordinator.rollback(ticket, "connection error: closed").unwrap();

        assert_eq!(phase, MutationPhase::RolledBack);
        assert_eq!(coordinator.phase(ticket), MutationPhase::Idle);
        assert_eq!(coordinator.courses(), before);
        let drained = notices.take();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].is_error());
    }

    #[test]
    fn confirm_replaces_local_list_with_server_data() {
        let (coordinator, notices) = coordinator(vec![course(1, &[(10, false)])]);
        let ticket = coordinator.begin(toggle(1, 10), fixed_now()).unwrap();

        let server = vec![course(1, &[(10, true)]), course(3, &[])];
        coordinator.confirm(ticket, server.clone()).unwrap();

        assert_eq!(coordinator.courses(), server);
        assert_eq!(coordinator.in_flight(), 0);
        assert!(!notices.take()[0].is_error());
    }

    #[test]
    fn unknown_target_changes_nothing() {
        let before = vec![course(1, &[(10, false)])];
        let (coordinator, _) = coordinator(before.clone());

        assert_eq!(
            coordinator.begin(toggle(9, 10), fixed_now()),
            Err(MutationError::CourseNotFound(CourseId::new(9)))
        );
        assert!(matches!(
            coordinator.begin(toggle(1, 99), fixed_now()),
            Err(MutationError::ModuleNotFound { .. })
        ));
        assert_eq!(coordinator.courses(), before);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[test]
    fn settling_twice_is_rejected() {
        let (coordinator, notices) = coordinator(vec![course(1, &[(10, false)])]);
        let ticket = coordinator.begin(toggle(1, 10), fixed_now()).unwrap();
        coordinator.rollback(ticket, "boom").unwrap();

        assert_eq!(
            coordinator.rollback(ticket, "boom"),
            Err(MutationError::UnknownTicket(ticket))
        );
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn second_mutation_snapshots_optimistic_state() {
        let original = vec![course(1, &[(10, false), (11, false)])];
        let (coordinator, _) = coordinator(original.clone());

        let first = coordinator.begin(toggle(1, 10), fixed_now()).unwrap();
        let after_first = coordinator.courses();
        let second = coordinator.begin(toggle(1, 11), fixed_now()).unwrap();

        // second fails first: back to the state the first mutation produced
        coordinator.rollback(second, "boom").unwrap();
        assert_eq!(coordinator.courses(), after_first);

        coordinator.rollback(first, "boom").unwrap();
        assert_eq!(coordinator.courses(), original);
    }

    #[test]
    fn sync_is_deferred_while_mutations_are_in_flight() {
        let (coordinator, _) = coordinator(vec![course(1, &[(10, false)])]);
        let ticket = coordinator.begin(toggle(1, 10), fixed_now()).unwrap();
        let optimistic = coordinator.courses();

        assert!(!coordinator.sync(vec![]));
        assert_eq!(coordinator.courses(), optimistic);

        coordinator.confirm(ticket, vec![]).unwrap();
        assert!(coordinator.courses().is_empty());
    }

    #[test]
    fn patch_and_remove_apply_locally() {
        let (coordinator, _) = coordinator(vec![course(1, &[(10, false)]), course(2, &[])]);

        coordinator
            .begin(
                LocalMutation::PatchCourse {
                    course_id: CourseId::new(1),
                    patch: CoursePatch {
                        title: Some("Renamed".into()),
                        certificate: Some(Some(Certificate::from_persisted(
                            "https://example.com/cert.pdf",
                            None,
                        ))),
                    },
                },
                fixed_now(),
            )
            .unwrap();
        coordinator
            .begin(
                LocalMutation::PatchModule {
                    course_id: CourseId::new(1),
                    module_id: ModuleId::new(10),
                    patch: ModulePatch {
                        hours: Some(3),
                        ..ModulePatch::default()
                    },
                },
                fixed_now(),
            )
            .unwrap();
        coordinator
            .begin(
                LocalMutation::RemoveCourse {
                    course_id: CourseId::new(2),
                },
                fixed_now(),
            )
            .unwrap();

        let local = coordinator.courses();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].title(), "Renamed");
        assert!(local[0].certificate().is_some());
        assert_eq!(local[0].modules()[0].hours(), 3);
        assert_eq!(coordinator.in_flight(), 3);
    }
}
