//! Shared record contract and identity types.
//!
//! # Responsibility
//! - Provide the identity newtypes shared by every record kind.
//! - Define the `Record` trait used by the generic entity store.
//!
//! # Invariants
//! - Client-local ids always start with `local-` and carry a fresh v4 UUID.
//! - Server-assigned ids never start with `local-`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

const LOCAL_ID_PREFIX: &str = "local-";

/// Record identity, either client-local (optimistic) or server-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an id received from the server or from storage.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh id in the client-local identifier space.
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Returns whether this id was generated locally and has no server meaning.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Owning identity supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input validation failure raised before any state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty after trimming.
    EmptyField(&'static str),
    /// A numeric field falls outside its accepted range.
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "`{field}` must not be empty"),
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "`{field}` must be within {min}..={max}, got {value}"),
        }
    }
}

impl Error for ValidationError {}

/// Contract for one record kind held by an entity store.
///
/// # Invariants
/// - `id()` is unique within one store.
/// - `draft()` builds the optimistic version shown before confirmation.
pub trait Record: Clone + Debug + PartialEq + Serialize + DeserializeOwned + 'static {
    /// Creation payload: a record without `id` and timestamp.
    type Input: Clone + Debug + PartialEq + Serialize + DeserializeOwned + 'static;
    /// Partial update payload.
    type Patch: Clone + Debug + PartialEq + Serialize + DeserializeOwned + 'static;

    /// Stable kind label used in log lines and storage keys.
    const KIND: &'static str;

    fn id(&self) -> &RecordId;

    /// Timestamp marking how relevant (recent) this record is.
    fn relevance(&self) -> DateTime<Utc>;

    /// Builds a record from creation input, stamped with `now`.
    fn draft(id: RecordId, user_id: UserId, input: Self::Input, now: DateTime<Utc>) -> Self;

    /// Validates creation input. Accepts everything unless overridden.
    fn validate_input(_input: &Self::Input) -> Result<(), ValidationError> {
        Ok(())
    }
}
