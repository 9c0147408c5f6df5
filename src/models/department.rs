// src/models/department.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'departments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub college_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Department row joined with its college name, as served to onboarding.
#[derive(Debug, Serialize, FromRow)]
pub struct DepartmentWithCollege {
    pub id: i64,
    pub name: String,
    pub college_id: i64,
    pub college_name: String,
}

/// DTO for creating a department under a college.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDepartmentRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub college_id: i64,
}
