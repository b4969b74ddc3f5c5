//! Newtype IDs for type-safe identifiers.
//!
//! Server-assigned ids are positive. Records created optimistically carry a
//! temporary negative id until the server confirms them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_TEMPORARY: AtomicI64 = AtomicI64::new(-1);

/// Macro to generate newtype ID structs.
macro_rules! define_id {
    ($name:ident) => {
        /// A numeric identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create an ID from a server-assigned value.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Allocate a temporary placeholder ID (always negative, unique per process).
            pub fn temporary() -> Self {
                Self(NEXT_TEMPORARY.fetch_sub(1, Ordering::Relaxed))
            }

            /// Check if this is a placeholder ID.
            pub fn is_temporary(&self) -> bool {
                self.0 < 0
            }

            /// Get the raw value.
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(CourseId);
define_id!(CategoryId);
define_id!(EnrollmentId);
define_id!(LessonId);
define_id!(UserId);
