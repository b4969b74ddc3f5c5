//! Lesson types.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::ids::{CourseId, LessonId};

/// A lesson with its content and the current user's completion state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDetail {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Position within the course.
    pub position: u32,
    #[serde(default)]
    pub completed: bool,
}

impl Entity for LessonDetail {
    type Id = LessonId;
    const KIND: &'static str = "lesson";

    fn id(&self) -> LessonId {
        self.id
    }
}
