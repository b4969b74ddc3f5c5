//! Mutation error types.

use lms_data::{ErrorClass, FetchError};
use thiserror::Error;

use crate::mutation::MutationKind;

/// User-facing classification of a failed remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationFailure {
    /// 409: the write collides with existing state.
    Conflict,
    /// 404/410: the record is gone.
    NotFound,
    /// 403.
    Forbidden,
    /// 401.
    Unauthorized,
    /// 400/422.
    Invalid,
    /// Network failure, timeout or 5xx.
    Unavailable,
    /// Anything else.
    Failed,
}

impl MutationFailure {
    /// Classify a transport failure.
    pub fn classify(err: &FetchError) -> Self {
        match (err.class(), err.status()) {
            (ErrorClass::Conflict, _) => Self::Conflict,
            (ErrorClass::NotFound, _) => Self::NotFound,
            (ErrorClass::Permission, Some(401)) => Self::Unauthorized,
            (ErrorClass::Permission, _) => Self::Forbidden,
            (ErrorClass::Invalid, _) => Self::Invalid,
            (ErrorClass::Transient, _) => Self::Unavailable,
            (ErrorClass::Rejected | ErrorClass::Malformed, _) => Self::Failed,
        }
    }

    /// Human-readable message for a failed `kind` mutation.
    pub fn describe(&self, kind: MutationKind) -> String {
        match (self, kind) {
            (Self::Conflict, MutationKind::Enroll) => {
                "Conflict: already enrolled in this course".to_string()
            }
            (Self::Conflict, MutationKind::CreateCourse) => {
                "Conflict: a course with this title already exists".to_string()
            }
            (Self::Conflict, MutationKind::UpdateUser) => {
                "Conflict: this email address is already in use".to_string()
            }
            (Self::Conflict, _) => format!(
                "Could not {}: the record was changed elsewhere",
                kind.action()
            ),
            (Self::NotFound, MutationKind::Unenroll) => {
                "The enrollment no longer exists".to_string()
            }
            (Self::NotFound, _) => format!("Could not {}: it no longer exists", kind.action()),
            (Self::Forbidden, _) => format!("You do not have permission to {}", kind.action()),
            (Self::Unauthorized, _) => "Your session has expired, please sign in again".to_string(),
            (Self::Invalid, _) => format!("Could not {}: the request was invalid", kind.action()),
            (Self::Unavailable, _) => format!(
                "Could not {}: the server is unreachable, please try again",
                kind.action()
            ),
            (Self::Failed, _) => format!("Failed to {}", kind.action()),
        }
    }
}

/// Errors returned by optimistic mutations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    /// The remote operation failed; local state was rolled back.
    #[error("{message}")]
    Remote {
        kind: MutationKind,
        failure: MutationFailure,
        message: String,
        #[source]
        source: FetchError,
    },

    /// Another mutation of the same entity has not finished.
    #[error("A change to {entity} is still in progress")]
    Pending { kind: MutationKind, entity: String },
}

impl MutationError {
    /// Build a classified error from a failed remote call.
    pub fn remote(kind: MutationKind, source: FetchError) -> Self {
        let failure = MutationFailure::classify(&source);
        Self::Remote {
            kind,
            failure,
            message: failure.describe(kind),
            source,
        }
    }

    /// The mutation kind that failed.
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Remote { kind, .. } | Self::Pending { kind, .. } => *kind,
        }
    }

    /// The failure classification, if the remote call failed.
    pub fn failure(&self) -> Option<MutationFailure> {
        match self {
            Self::Remote { failure, .. } => Some(*failure),
            Self::Pending { .. } => None,
        }
    }

    /// The transport error, if the remote call failed.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            Self::Pending { .. } => None,
        }
    }
}
