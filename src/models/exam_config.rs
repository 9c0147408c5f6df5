// src/models/exam_config.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the singleton 'exam_config' row.
/// Created lazily with defaults (30 minutes, 10 questions) on first read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamConfig {
    pub time_limit_minutes: i32,
    pub num_questions: i32,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for updating the exam configuration.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateConfigRequest {
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: i32,
    #[validate(range(min = 1, max = 500))]
    pub num_questions: i32,
}
