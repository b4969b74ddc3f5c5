//! Mutation kinds and the context they carry to invalidation.

use std::fmt;

use lms_domain::{CategoryId, CourseId, EnrollmentId, LessonId, UserId};
use serde::{Deserialize, Serialize};

/// Kinds of remote writes the client performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Enroll,
    Unenroll,
    UpdateEnrollmentStatus,
    CreateCourse,
    UpdateCourse,
    DeleteCourse,
    UpdateUser,
    UpdateUserStatus,
    DeleteUser,
    CompleteLesson,
}

impl MutationKind {
    /// Every mutation kind.
    pub const ALL: [MutationKind; 10] = [
        Self::Enroll,
        Self::Unenroll,
        Self::UpdateEnrollmentStatus,
        Self::CreateCourse,
        Self::UpdateCourse,
        Self::DeleteCourse,
        Self::UpdateUser,
        Self::UpdateUserStatus,
        Self::DeleteUser,
        Self::CompleteLesson,
    ];

    /// Get the name of this mutation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enroll => "enroll",
            Self::Unenroll => "unenroll",
            Self::UpdateEnrollmentStatus => "update_enrollment_status",
            Self::CreateCourse => "create_course",
            Self::UpdateCourse => "update_course",
            Self::DeleteCourse => "delete_course",
            Self::UpdateUser => "update_user",
            Self::UpdateUserStatus => "update_user_status",
            Self::DeleteUser => "delete_user",
            Self::CompleteLesson => "complete_lesson",
        }
    }

    /// What the user was trying to do, for messages.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Enroll => "enroll in the course",
            Self::Unenroll => "leave the course",
            Self::UpdateEnrollmentStatus => "update the enrollment",
            Self::CreateCourse => "create the course",
            Self::UpdateCourse => "update the course",
            Self::DeleteCourse => "delete the course",
            Self::UpdateUser => "update the user",
            Self::UpdateUserStatus => "change the user's status",
            Self::DeleteUser => "delete the user",
            Self::CompleteLesson => "mark the lesson complete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ids touched by a mutation, used to narrow invalidation to single keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationContext {
    pub course_id: Option<CourseId>,
    pub user_id: Option<UserId>,
    pub enrollment_id: Option<EnrollmentId>,
    pub lesson_id: Option<LessonId>,
    pub category_id: Option<CategoryId>,
}

impl MutationContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(mut self, id: CourseId) -> Self {
        self.course_id = Some(id);
        self
    }

    pub fn user(mut self, id: UserId) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn enrollment(mut self, id: EnrollmentId) -> Self {
        self.enrollment_id = Some(id);
        self
    }

    pub fn lesson(mut self, id: LessonId) -> Self {
        self.lesson_id = Some(id);
        self
    }

    pub fn category(mut self, id: CategoryId) -> Self {
        self.category_id = Some(id);
        self
    }
}
