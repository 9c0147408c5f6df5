// src/models/question_set.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'question_sets' table in the database.
///
/// A set owns its questions only by name: questions carry a matching
/// `set_name` string. Name uniqueness is enforced here so the soft
/// reference stays unambiguous.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: i64,
    pub name: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new question set.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSetRequest {
    #[validate(length(min = 1, max = 100, message = "Set name cannot be empty."))]
    pub name: String,
}
