//! Tic log record: one logged occurrence of a tic.
//!
//! # Invariants
//! - `intensity` is within `1..=10`.
//! - `tic_type_id` is never blank.

use crate::model::record::{Record, RecordId, UserId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 10;

/// Coarse part of the day a tic occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

/// Confirmed or optimistic tic log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicLog {
    pub id: RecordId,
    pub user_id: UserId,
    pub tic_type_id: String,
    pub intensity: u8,
    pub time_of_day: TimeOfDay,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

/// Creation input for a tic log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicLogInput {
    pub tic_type_id: String,
    pub intensity: u8,
    pub time_of_day: TimeOfDay,
    pub notes: String,
}

/// Partial update for a tic log; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicLogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tic_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Record for TicLog {
    type Input = TicLogInput;
    type Patch = TicLogPatch;

    const KIND: &'static str = "tic_log";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn relevance(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn draft(id: RecordId, user_id: UserId, input: TicLogInput, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            tic_type_id: input.tic_type_id,
            intensity: input.intensity,
            time_of_day: input.time_of_day,
            notes: input.notes,
            timestamp: now,
        }
    }

    fn validate_input(input: &TicLogInput) -> Result<(), ValidationError> {
        if input.tic_type_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("ticTypeId"));
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&input.intensity) {
            return Err(ValidationError::OutOfRange {
                field: "intensity",
                value: i64::from(input.intensity),
                min: i64::from(MIN_INTENSITY),
                max: i64::from(MAX_INTENSITY),
            });
        }
        Ok(())
    }
}
