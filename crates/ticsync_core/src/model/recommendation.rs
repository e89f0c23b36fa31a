//! Recommendation record and the feedback users leave on it.
//!
//! Recommendations are derived server-side from recent tic logs of one tic
//! type (the subject); users mark them helpful or not.

use crate::model::record::{Record, RecordId, UserId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: RecordId,
    pub user_id: UserId,
    /// Subject the recommendation was generated for.
    pub tic_type_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub helpful: Option<bool>,
    pub feedback_notes: Option<String>,
    pub last_used_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationInput {
    pub tic_type_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
}

/// Feedback and usage patch. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helpful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_date: Option<DateTime<Utc>>,
}

impl RecommendationPatch {
    /// Patch recording a helpful/unhelpful verdict.
    pub fn feedback(helpful: bool, notes: Option<String>) -> Self {
        Self {
            helpful: Some(helpful),
            feedback_notes: notes,
            last_used_date: None,
        }
    }
}

impl Record for Recommendation {
    type Input = RecommendationInput;
    type Patch = RecommendationPatch;

    const KIND: &'static str = "recommendation";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn relevance(&self) -> DateTime<Utc> {
        self.last_used_date
    }

    fn draft(id: RecordId, user_id: UserId, input: RecommendationInput, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            tic_type_id: input.tic_type_id,
            title: input.title,
            description: input.description,
            category: input.category,
            helpful: None,
            feedback_notes: None,
            last_used_date: now,
            created_at: now,
        }
    }

    fn validate_input(input: &RecommendationInput) -> Result<(), ValidationError> {
        if input.tic_type_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("ticTypeId"));
        }
        if input.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        Ok(())
    }
}
