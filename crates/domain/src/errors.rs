use cqrs_es::AggregateError;
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Uniqueness conflict: {field}")]
    Uniqueness { field: String },

    #[error("Permission denied: user {user_id} has no assigned role")]
    NoRole { user_id: String },

    #[error("Permission denied: role {role} may not {operation}")]
    InsufficientRole { role: String, operation: String },

    #[error("Dispatch is {state} and can no longer be changed")]
    TerminalState { state: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Dispatch was modified concurrently, reload and retry")]
    WriteConflict,

    #[error("Storage error: {message}")]
    Storage { message: String },
}

/// Coarse error taxonomy handed to the presentation layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    PermissionDenied,
    StateConflict,
    NotFound,
    WriteConflict,
    Storage,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::NoRole { .. } | Error::InsufficientRole { .. } => ErrorKind::PermissionDenied,
            Error::TerminalState { .. }
            | Error::InvalidStateTransition { .. }
            | Error::Uniqueness { .. } => ErrorKind::StateConflict,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::WriteConflict => ErrorKind::WriteConflict,
            Error::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        Error::NotFound {
            entity: format!("{entity} {id}"),
        }
    }
}

impl From<AggregateError<Error>> for Error {
    fn from(err: AggregateError<Error>) -> Self {
        match err {
            AggregateError::UserError(err) => err,
            AggregateError::AggregateConflict => Error::WriteConflict,
            other => Error::Storage {
                message: other.to_string(),
            },
        }
    }
}
