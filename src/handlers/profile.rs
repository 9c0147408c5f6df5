// src/handlers/profile.rs

use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        college::College,
        department::DepartmentWithCollege,
        user::{UpdateProfileRequest, User},
    },
    utils::jwt::Claims,
};

/// Returns the current user's profile.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, full_name, email, college, department, roll_no, created_at
         FROM users
         WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Updates the current user's onboarding profile fields.
/// Only provided fields are changed.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users
         SET full_name = COALESCE($1, full_name),
             email = COALESCE($2, email),
             college = COALESCE($3, college),
             department = COALESCE($4, department),
             roll_no = COALESCE($5, roll_no)
         WHERE id = $6
         RETURNING id, username, password, role, full_name, email, college, department, roll_no, created_at",
    )
    .bind(&payload.full_name)
    .bind(&payload.email)
    .bind(&payload.college)
    .bind(&payload.department)
    .bind(&payload.roll_no)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Lists colleges for the onboarding form. Public.
pub async fn list_colleges(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let colleges = sqlx::query_as::<_, College>(
        "SELECT id, name, created_at FROM colleges ORDER BY name ASC",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(colleges))
}

/// Lists departments with their college names. Public.
pub async fn list_departments(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let departments = sqlx::query_as::<_, DepartmentWithCollege>(
        "SELECT d.id, d.name, d.college_id, c.name AS college_name
         FROM departments d
         JOIN colleges c ON c.id = d.college_id
         ORDER BY c.name ASC, d.name ASC",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(departments))
}
