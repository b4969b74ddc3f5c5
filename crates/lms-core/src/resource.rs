//! Resource kinds with their default freshness policies.

use std::time::Duration;

/// Well-known cached resource types of the learning platform.
///
/// Each kind carries a default freshness window (TTL) and a default fetch timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Course listings (all courses, courses per category).
    CourseListing,
    /// A single course with its modules. Rarely changes.
    CourseDetail,
    /// Enrollments of the current user.
    Enrollments,
    /// Lesson content and progress.
    LessonDetail,
    /// Aggregated dashboard statistics.
    OverallStats,
    /// User administration listings.
    Users,
    /// Custom resource with name.
    Custom(&'static str),
}

impl ResourceKind {
    /// All built-in kinds (excluding `Custom`).
    pub const BUILT_IN: [ResourceKind; 6] = [
        Self::CourseListing,
        Self::CourseDetail,
        Self::Enrollments,
        Self::LessonDetail,
        Self::OverallStats,
        Self::Users,
    ];

    /// Get the default TTL for this resource type.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Enrollments | Self::LessonDetail => Duration::from_secs(2 * 60),
            Self::CourseListing | Self::OverallStats | Self::Users => Duration::from_secs(5 * 60),
            Self::CourseDetail => Duration::from_secs(10 * 60),
            Self::Custom(_) => Duration::from_secs(5 * 60),
        }
    }

    /// Get the default fetch timeout for this resource type.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::OverallStats => Duration::from_secs(15), // aggregate queries are slow
            _ => Duration::from_secs(10),
        }
    }

    /// Get the name of this resource.
    pub fn name(&self) -> &str {
        match self {
            Self::CourseListing => "course_listing",
            Self::CourseDetail => "course_detail",
            Self::Enrollments => "enrollments",
            Self::LessonDetail => "lesson_detail",
            Self::OverallStats => "overall_stats",
            Self::Users => "users",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
