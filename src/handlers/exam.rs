// src/handlers/exam.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    cache::Cache,
    error::AppError,
    exam::session,
    models::exam_attempt::SubmitExamRequest,
    utils::jwt::Claims,
};

fn caller_id(claims: &Claims) -> Result<i64, AppError> {
    claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
}

/// Starts the caller's exam attempt, or resumes the current one.
/// A terminal attempt is returned unchanged; the frontend redirects to the
/// results view based on its status.
pub async fn start_session(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = caller_id(&claims)?;
    let attempt = session::start_or_resume_session(&pool, &cache, user_id).await?;
    Ok(Json(attempt))
}

/// Returns the questions for an attempt, answers omitted.
/// An unknown attempt id yields an empty list (no exam available).
pub async fn get_questions(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let questions = session::fetch_deliverable_questions(&pool, &cache, attempt_id).await?;
    Ok(Json(questions))
}

/// Submits answers for an attempt. The outcome is 'completed' for a normal
/// submission or 'terminated' when the proctoring UI force-submits.
pub async fn submit(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
    Json(payload): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = session::submit_session(
        &pool,
        &cache,
        payload.attempt_id,
        &payload.answers,
        payload.outcome,
    )
    .await?;

    Ok(Json(json!({
        "score": attempt.score,
        "total_questions": attempt.total_questions,
        "status": attempt.status,
    })))
}

/// Returns the exam configuration (time limit, question count).
pub async fn get_config(
    State(pool): State<PgPool>,
    State(cache): State<Cache>,
) -> Result<impl IntoResponse, AppError> {
    let config = session::cached_exam_config(&pool, &cache).await?;
    Ok(Json(config))
}

/// Returns the caller's most recent attempt, or null if they have none.
pub async fn get_result(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = caller_id(&claims)?;
    let attempt = session::latest_attempt(&pool, user_id).await?;
    Ok(Json(attempt))
}
