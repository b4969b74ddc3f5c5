//! Enrollment types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::DomainError;
use crate::ids::{CourseId, EnrollmentId, UserId};

/// State of an enrollment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    /// In progress.
    #[default]
    Active,
    /// All lessons completed.
    Completed,
    /// Left by the student or an administrator.
    Dropped,
}

impl EnrollmentStatus {
    /// The status an activate/deactivate toggle moves to.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Active => Self::Dropped,
            Self::Dropped | Self::Completed => Self::Active,
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "dropped" => Ok(Self::Dropped),
            other => Err(DomainError::UnknownVariant {
                kind: "enrollment status",
                value: other.to_string(),
            }),
        }
    }
}

/// A user's enrollment in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Enrollment identifier.
    pub id: EnrollmentId,
    /// Enrolled user.
    pub user_id: UserId,
    /// Course.
    pub course_id: CourseId,
    /// State.
    #[serde(default)]
    pub status: EnrollmentStatus,
    /// Completion percentage (0..=100).
    #[serde(default)]
    pub progress: u8,
}

impl Enrollment {
    /// Create a placeholder enrollment with a temporary id.
    pub fn pending(user_id: UserId, course_id: CourseId) -> Self {
        Self {
            id: EnrollmentId::temporary(),
            user_id,
            course_id,
            status: EnrollmentStatus::Active,
            progress: 0,
        }
    }

    /// Set progress, marking the enrollment completed at 100%.
    pub fn set_progress(&mut self, progress: u32) -> Result<(), DomainError> {
        if progress > 100 {
            return Err(DomainError::InvalidProgress(progress));
        }
        self.progress = progress as u8;
        if progress == 100 {
            self.status = EnrollmentStatus::Completed;
        }
        Ok(())
    }
}

impl Entity for Enrollment {
    type Id = EnrollmentId;
    const KIND: &'static str = "enrollment";

    fn id(&self) -> EnrollmentId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending() {
        let e = Enrollment::pending(UserId::new(1), CourseId::new(9));
        assert!(e.id.is_temporary());
        assert_eq!(e.status, EnrollmentStatus::Active);
    }

    #[test]
    fn test_progress() {
        let mut e = Enrollment::pending(UserId::new(1), CourseId::new(9));
        e.set_progress(40).unwrap();
        assert_eq!(e.status, EnrollmentStatus::Active);
        e.set_progress(100).unwrap();
        assert_eq!(e.status, EnrollmentStatus::Completed);
        assert_eq!(e.set_progress(101), Err(DomainError::InvalidProgress(101)));
    }

    #[test]
    fn test_toggle() {
        assert_eq!(EnrollmentStatus::Active.toggled(), EnrollmentStatus::Dropped);
        assert_eq!(EnrollmentStatus::Dropped.toggled(), EnrollmentStatus::Active);
        assert_eq!("dropped".parse::<EnrollmentStatus>().unwrap(), EnrollmentStatus::Dropped);
    }
}
