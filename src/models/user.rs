// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// User roles.
pub mod role {
    pub const STUDENT: &str = "student";
    pub const ADMIN: &str = "admin";
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// User role: 'student' or 'admin'.
    pub role: String,

    pub full_name: Option<String>,
    pub email: Option<String>,
    pub college: Option<String>,
    pub department: Option<String>,
    pub roll_no: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for onboarding / profile updates. All fields optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub college: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub department: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub roll_no: Option<String>,
}

/// Admin listing row: user plus a summary of their most recent attempt.
/// Fetched with one lateral join, not a per-user query.
#[derive(Debug, Serialize, FromRow)]
pub struct UserWithAttempt {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub college: Option<String>,
    pub department: Option<String>,
    pub roll_no: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    pub attempt_id: Option<i64>,
    pub attempt_status: Option<String>,
    pub score: Option<i32>,
    pub total_questions: Option<i32>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}
