//! Mutation payloads and queued retry attempts.
//!
//! # Invariants
//! - A `PendingOperation` is never edited; a retry produces a fresh one.
//! - Replays of one logical create share the same `client_ref`.

use crate::model::record::{Record, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Feedback,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Feedback => "feedback",
        }
    }
}

/// One store mutation, as issued by a caller or replayed from the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "snake_case",
    rename_all_fields = "camelCase",
    bound = "R: Record"
)]
pub enum Mutation<R: Record> {
    Create { client_ref: Uuid, input: R::Input },
    Update { id: RecordId, patch: R::Patch },
    Delete { id: RecordId },
    Feedback { id: RecordId, patch: R::Patch },
}

impl<R: Record> Mutation<R> {
    /// Create mutation with a fresh logical identity.
    pub fn create(input: R::Input) -> Self {
        Self::Create {
            client_ref: Uuid::new_v4(),
            input,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
            Self::Feedback { .. } => OperationKind::Feedback,
        }
    }

    /// Key naming the logical change, shared by every retry of it.
    pub fn logical_key(&self) -> String {
        match self {
            Self::Create { client_ref, .. } => format!("create:{client_ref}"),
            Self::Update { id, .. } | Self::Delete { id } | Self::Feedback { id, .. } => {
                format!("{}:{id}", self.kind().as_str())
            }
        }
    }
}

/// Mutation applied locally (or attempted) but not yet confirmed remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "R: Record")]
pub struct PendingOperation<R: Record> {
    pub op_id: Uuid,
    pub mutation: Mutation<R>,
    pub enqueued_at: DateTime<Utc>,
}

impl<R: Record> PendingOperation<R> {
    pub fn new(mutation: Mutation<R>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            mutation,
            enqueued_at,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.mutation.kind()
    }

    pub fn logical_key(&self) -> String {
        self.mutation.logical_key()
    }
}
