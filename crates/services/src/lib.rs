#![forbid(unsafe_code)]

pub mod app_services;
pub mod cache;
pub mod coordinator;
pub mod course_service;
pub mod error;
pub mod goal_service;
pub mod notices;

pub use study_core::Clock;

pub use app_services::AppServices;
pub use cache::{CacheKey, QueryCache};
pub use coordinator::{
    LocalMutation, MutationCoordinator, MutationError, MutationPhase, MutationTicket,
};
pub use course_service::CourseService;
pub use error::{AppServicesError, CourseServiceError, GoalServiceError};
pub use goal_service::GoalService;
pub use notices::{Notice, NoticeLevel, Notifications};
