// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    cache::Cache,
    error::AppError,
    exam::session,
    models::{
        college::{College, CreateCollegeRequest},
        department::{CreateDepartmentRequest, DepartmentWithCollege},
        exam_config::{ExamConfig, UpdateConfigRequest},
        question::{Question, QuestionRequest},
        question_set::{CreateSetRequest, QuestionSet},
        user::UserWithAttempt,
    },
};

// Every mutation below touches the store first and invalidates the cache
// second. The other order would let a concurrent reader repopulate the
// cache from pre-mutation data in the gap.

// --- Question sets ---

/// Lists all question sets.
pub async fn list_sets(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let sets = sqlx::query_as::<_, QuestionSet>(
        "SELECT id, name, created_at FROM question_sets ORDER BY created_at ASC",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(sets))
}

/// Creates a new question set. The name is trimmed and must be unique.
pub async fn create_set(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Json(payload): Json<CreateSetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Set name cannot be empty".to_string()));
    }

    let set = sqlx::query_as::<_, QuestionSet>(
        "INSERT INTO question_sets (name) VALUES ($1) RETURNING id, name, created_at",
    )
    .bind(&name)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Set \"{}\" already exists", name))
        } else {
            tracing::error!("Failed to create set: {:?}", e);
            AppError::from(e)
        }
    })?;

    cache.invalidate("question").await;
    Ok((StatusCode::CREATED, Json(set)))
}

/// Deletes a question set and every question whose set_name matches it.
pub async fn delete_set(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let set = sqlx::query_as::<_, QuestionSet>(
        "SELECT id, name, created_at FROM question_sets WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Set not found".to_string()))?;

    let deleted = sqlx::query("DELETE FROM questions WHERE set_name = $1")
        .bind(&set.name)
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM question_sets WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(
        "Deleted set \"{}\" and {} of its questions",
        set.name,
        deleted.rows_affected()
    );

    cache.invalidate("question").await;
    Ok(StatusCode::NO_CONTENT)
}

// --- Questions ---

/// Lists all questions, including answers. Admin view only.
pub async fn list_questions(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        "SELECT id, question_text, options, correct_option, set_name, section_name, created_at
         FROM questions
         ORDER BY created_at ASC",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(questions))
}

/// Creates a new question.
pub async fn create_question(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let options: Vec<String> = payload.options.iter().map(|o| o.trim().to_string()).collect();

    let question = sqlx::query_as::<_, Question>(
        "INSERT INTO questions (question_text, options, correct_option, set_name, section_name)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, question_text, options, correct_option, set_name, section_name, created_at",
    )
    .bind(payload.question_text.trim())
    .bind(sqlx::types::Json(options))
    .bind(payload.correct_option)
    .bind(payload.clean_set_name())
    .bind(payload.clean_section_name())
    .fetch_one(&pool)
    .await?;

    cache.invalidate("question").await;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Replaces a question's text, options, answer and set/section.
pub async fn update_question(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Path(id): Path<i64>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let options: Vec<String> = payload.options.iter().map(|o| o.trim().to_string()).collect();

    let result = sqlx::query(
        "UPDATE questions
         SET question_text = $1, options = $2, correct_option = $3, set_name = $4, section_name = $5
         WHERE id = $6",
    )
    .bind(payload.question_text.trim())
    .bind(sqlx::types::Json(options))
    .bind(payload.correct_option)
    .bind(payload.clean_set_name())
    .bind(payload.clean_section_name())
    .bind(id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    cache.invalidate("question").await;
    Ok(StatusCode::OK)
}

/// Deletes a question by ID.
pub async fn delete_question(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    cache.invalidate("question").await;
    Ok(StatusCode::NO_CONTENT)
}

// --- Exam configuration ---

/// Updates the exam time limit and question count.
pub async fn update_config(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Json(payload): Json<UpdateConfigRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let config = sqlx::query_as::<_, ExamConfig>(
        "INSERT INTO exam_config (id, time_limit_minutes, num_questions, updated_at)
         VALUES (1, $1, $2, NOW())
         ON CONFLICT (id) DO UPDATE
         SET time_limit_minutes = EXCLUDED.time_limit_minutes,
             num_questions = EXCLUDED.num_questions,
             updated_at = NOW()
         RETURNING time_limit_minutes, num_questions, updated_at",
    )
    .bind(payload.time_limit_minutes)
    .bind(payload.num_questions)
    .fetch_one(&pool)
    .await?;

    cache.invalidate("config").await;
    Ok(Json(config))
}

// --- Users ---

/// Lists all students with a summary of their most recent attempt.
/// One lateral join; no per-user queries.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, UserWithAttempt>(
        "SELECT u.id, u.username, u.role, u.full_name, u.email, u.college, u.department,
                u.roll_no, u.created_at,
                a.id AS attempt_id, a.status AS attempt_status, a.score, a.total_questions,
                a.completed_at
         FROM users u
         LEFT JOIN LATERAL (
             SELECT id, status, score, total_questions, completed_at
             FROM exam_attempts
             WHERE user_id = u.id
             ORDER BY started_at DESC
             LIMIT 1
         ) a ON TRUE
         WHERE u.role <> 'admin'
         ORDER BY u.created_at DESC",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(users))
}

/// Deletes a user and their attempt history.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role <> 'admin'")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    sqlx::query("DELETE FROM exam_attempts WHERE user_id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Resets a student's exam: supersedes their current attempt with a fresh
/// one, assigned a different set whenever an alternative exists.
pub async fn reset_exam(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = session::reset_session(&pool, &cache, id).await?;
    Ok(Json(outcome))
}

// --- Colleges & departments ---

pub async fn create_college(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateCollegeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let college = sqlx::query_as::<_, College>(
        "INSERT INTO colleges (name) VALUES ($1) RETURNING id, name, created_at",
    )
    .bind(payload.name.trim())
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(college)))
}

pub async fn delete_college(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM colleges WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("College not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_department(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateDepartmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let department = sqlx::query_as::<_, DepartmentWithCollege>(
        "WITH inserted AS (
             INSERT INTO departments (name, college_id) VALUES ($1, $2)
             RETURNING id, name, college_id
         )
         SELECT i.id, i.name, i.college_id, c.name AS college_name
         FROM inserted i
         JOIN colleges c ON c.id = i.college_id",
    )
    .bind(payload.name.trim())
    .bind(payload.college_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("foreign key") {
            AppError::NotFound("College not found".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn delete_department(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM departments WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Department not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
