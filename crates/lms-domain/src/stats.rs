//! Dashboard statistics.

use serde::{Deserialize, Serialize};

/// Platform-wide counters shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_courses: u64,
    pub total_users: u64,
    pub total_enrollments: u64,
    pub completed_enrollments: u64,
}

impl OverallStats {
    /// Fraction of enrollments completed (0.0 when there are none).
    pub fn completion_rate(&self) -> f64 {
        if self.total_enrollments == 0 {
            0.0
        } else {
            self.completed_enrollments as f64 / self.total_enrollments as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_rate() {
        assert_eq!(OverallStats::default().completion_rate(), 0.0);
        let stats = OverallStats {
            total_enrollments: 4,
            completed_enrollments: 1,
            ..Default::default()
        };
        assert!((stats.completion_rate() - 0.25).abs() < f64::EPSILON);
    }
}
