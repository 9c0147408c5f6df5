// src/models/college.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'colleges' table in the database.
/// Reference data for student onboarding.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct College {
    pub id: i64,
    pub name: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a college.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCollegeRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}
