#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod progress;
pub mod projection;
pub mod time;

pub use error::{FieldError, FieldErrorKind, ValidationErrors};
pub use time::Clock;
