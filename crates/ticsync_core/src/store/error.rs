//! Store-level error taxonomy.

use crate::model::record::{RecordId, ValidationError};
use crate::ports::remote::RemoteError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by store operations.
///
/// `Unauthenticated`, `NotFound` and `Validation` are raised before any state
/// change. Remote variants are raised after rollback/enqueue has happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Unauthenticated,
    NotFound(RecordId),
    Validation(ValidationError),
    RemoteRejected { status: u16, message: String },
    RemoteUnreachable(String),
}

impl StoreError {
    /// Whether replaying the same mutation later can succeed.
    ///
    /// Missing targets and invalid input never heal on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unauthenticated | Self::RemoteRejected { .. } | Self::RemoteUnreachable(_) => {
                true
            }
            Self::NotFound(_) | Self::Validation(_) => false,
        }
    }

    /// Stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::RemoteUnreachable(_) => "remote_unreachable",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "no signed-in user"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::RemoteRejected { status, message } => {
                write!(f, "remote rejected request ({status}): {message}")
            }
            Self::RemoteUnreachable(message) => write!(f, "remote unreachable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RemoteError> for StoreError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::Rejected { status, message } => Self::RemoteRejected { status, message },
            RemoteError::Unreachable(message) => Self::RemoteUnreachable(message),
        }
    }
}
