//! Learning platform entities for the LMS client.
//!
//! - **Catalog**: courses and their publication state
//! - **Enrollments**: user/course enrollments and progress
//! - **Users**: accounts and roles
//! - **Lessons** and dashboard **stats**
//!
//! Records created on the client before the server confirms them carry
//! temporary negative ids (see [`CourseId::temporary`]).

pub mod course;
pub mod enrollment;
pub mod entity;
pub mod error;
pub mod ids;
pub mod lesson;
pub mod stats;
pub mod user;

pub use course::{Course, CourseStatus};
pub use enrollment::{Enrollment, EnrollmentStatus};
pub use entity::{entity_key, Entity};
pub use error::DomainError;
pub use ids::*;
pub use lesson::LessonDetail;
pub use stats::OverallStats;
pub use user::{User, UserRole};
