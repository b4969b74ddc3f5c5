//! Course catalog types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::DomainError;
use crate::ids::{CategoryId, CourseId, UserId};

/// Publication state of a course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    /// Being authored, hidden from students.
    #[default]
    Draft,
    /// Open for enrollment.
    Published,
    /// Closed; existing enrollments remain readable.
    Archived,
}

impl CourseStatus {
    /// Check if students can enroll.
    pub fn is_enrollable(&self) -> bool {
        matches!(self, Self::Published)
    }
}

impl FromStr for CourseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(DomainError::UnknownVariant {
                kind: "course status",
                value: other.to_string(),
            }),
        }
    }
}

/// A course in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Course identifier.
    pub id: CourseId,
    /// Title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Category the course is listed under.
    pub category_id: Option<CategoryId>,
    /// Instructor.
    pub instructor_id: UserId,
    /// Publication state.
    #[serde(default)]
    pub status: CourseStatus,
    /// Number of active enrollments.
    #[serde(default)]
    pub enrolled_count: u32,
}

impl Course {
    /// Create a draft placeholder with a temporary id.
    pub fn draft(title: impl Into<String>, instructor_id: UserId) -> Self {
        Self {
            id: CourseId::temporary(),
            title: title.into(),
            description: String::new(),
            category_id: None,
            instructor_id,
            status: CourseStatus::Draft,
            enrolled_count: 0,
        }
    }

    /// Set the category.
    pub fn in_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

impl Entity for Course {
    type Id = CourseId;
    const KIND: &'static str = "course";

    fn id(&self) -> CourseId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_has_temporary_id() {
        let course = Course::draft("Rust 101", UserId::new(3)).in_category(CategoryId::new(2));
        assert!(course.id.is_temporary());
        assert_eq!(course.status, CourseStatus::Draft);
        assert_eq!(course.category_id, Some(CategoryId::new(2)));
        assert_eq!(course.entity_key(), format!("course:{}", course.id));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("published".parse::<CourseStatus>().unwrap(), CourseStatus::Published);
        assert!("hidden".parse::<CourseStatus>().is_err());
        assert!(CourseStatus::Published.is_enrollable());
        assert!(!CourseStatus::Archived.is_enrollable());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let course: Course = serde_json::from_str(
            r#"{"id": 5, "title": "SQL", "category_id": null, "instructor_id": 1}"#,
        )
        .unwrap();
        assert_eq!(course.id, CourseId::new(5));
        assert_eq!(course.status, CourseStatus::Draft);
        assert_eq!(course.enrolled_count, 0);
    }
}
