mod course;
mod goal;
mod ids;
mod module;

pub use ids::{CourseId, ModuleId, ParseIdError};

pub use course::{
    Certificate, CertificateDraft, Course, CourseDraft, CourseEdit, CoursePatch, CourseUpdate,
    MIN_COURSE_TITLE_LEN, ModuleChange, ModuleEdit, NewCourse,
};
pub use goal::{StudyGoal, StudyGoalDraft};
pub use module::{Module, ModuleDraft, ModulePatch, NewModule};
