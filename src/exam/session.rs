// src/exam/session.rs
//
// The attempt lifecycle: start, resume, re-assign on drift, submit, reset.
//
// Attempts are mutated without in-process locks. Single-row UPDATEs are
// atomic in Postgres, every state-advancing statement re-checks
// `status = 'started'` in its WHERE clause, and a partial unique index
// allows at most one open attempt per user, so retried and racing calls
// collapse into a consistent outcome instead of corrupting state.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::{
    cache::Cache,
    error::AppError,
    exam::{assign::choose_set, scoring::score_answers},
    models::{
        exam_attempt::{ExamAttempt, Outcome, ResetOutcome},
        exam_config::ExamConfig,
        question::{DeliverableQuestion, Question},
    },
};

// Question-derived entries share the "question" substring so one
// invalidation pattern covers all of them; the config entry is scoped
// separately. The answer-bearing entry has its own key space and is never
// handed to a delivery caller.
const VALID_SETS_KEY: &str = "valid-question-sets";
const CONFIG_KEY: &str = "exam-config";

fn questions_key(set_name: &str) -> String {
    format!("questions-by-set:{}", set_name)
}

fn answers_key(set_name: &str) -> String {
    format!("questions-answers-by-set:{}", set_name)
}

const QUESTION_TTL: u64 = 3600;
const CONFIG_TTL: u64 = 3600;

/// Distinct non-blank set names that currently have at least one question.
/// This is the assignment pool; an attempt bound to a set outside it has
/// drifted and gets re-assigned on the next start call.
pub async fn cached_valid_sets(pool: &PgPool, cache: &Cache) -> Result<Vec<String>, AppError> {
    cache
        .get_or_compute(VALID_SETS_KEY, QUESTION_TTL, move || async move {
            let names = sqlx::query_scalar::<_, String>("SELECT DISTINCT set_name FROM questions")
                .fetch_all(pool)
                .await?;
            Ok(names
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect())
        })
        .await
}

/// Questions for a set in delivery order, with the answer field projected
/// out at the query level.
pub async fn cached_questions_for_set(
    pool: &PgPool,
    cache: &Cache,
    set_name: &str,
) -> Result<Vec<DeliverableQuestion>, AppError> {
    cache
        .get_or_compute(&questions_key(set_name), QUESTION_TTL, move || async move {
            let questions = sqlx::query_as::<_, DeliverableQuestion>(
                "SELECT id, question_text, options, section_name
                 FROM questions
                 WHERE set_name = $1
                 ORDER BY section_name ASC, created_at ASC, id ASC",
            )
            .bind(set_name)
            .fetch_all(pool)
            .await?;
            Ok(questions)
        })
        .await
}

/// Answer-bearing questions for a set. Scoring only; never serve this to
/// a student-facing caller.
pub async fn cached_questions_with_answers(
    pool: &PgPool,
    cache: &Cache,
    set_name: &str,
) -> Result<Vec<Question>, AppError> {
    cache
        .get_or_compute(&answers_key(set_name), QUESTION_TTL, move || async move {
            let questions = sqlx::query_as::<_, Question>(
                "SELECT id, question_text, options, correct_option, set_name, section_name, created_at
                 FROM questions
                 WHERE set_name = $1",
            )
            .bind(set_name)
            .fetch_all(pool)
            .await?;
            Ok(questions)
        })
        .await
}

/// The exam configuration, created lazily with defaults on first read.
pub async fn cached_exam_config(pool: &PgPool, cache: &Cache) -> Result<ExamConfig, AppError> {
    cache
        .get_or_compute(CONFIG_KEY, CONFIG_TTL, move || async move {
            let existing = sqlx::query_as::<_, ExamConfig>(
                "SELECT time_limit_minutes, num_questions, updated_at FROM exam_config WHERE id = 1",
            )
            .fetch_optional(pool)
            .await?;
            if let Some(config) = existing {
                return Ok(config);
            }
            let config = sqlx::query_as::<_, ExamConfig>(
                "INSERT INTO exam_config (id) VALUES (1)
                 ON CONFLICT (id) DO UPDATE SET id = exam_config.id
                 RETURNING time_limit_minutes, num_questions, updated_at",
            )
            .fetch_one(pool)
            .await?;
            Ok(config)
        })
        .await
}

/// Most recently started attempt for a user, i.e. their logical current one.
pub async fn latest_attempt(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<ExamAttempt>, AppError> {
    let attempt = sqlx::query_as::<_, ExamAttempt>(
        "SELECT id, user_id, status, assigned_set, score, total_questions, started_at, completed_at
         FROM exam_attempts
         WHERE user_id = $1
         ORDER BY started_at DESC
         LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

async fn find_attempt(pool: &PgPool, attempt_id: i64) -> Result<Option<ExamAttempt>, AppError> {
    let attempt = sqlx::query_as::<_, ExamAttempt>(
        "SELECT id, user_id, status, assigned_set, score, total_questions, started_at, completed_at
         FROM exam_attempts
         WHERE id = $1",
    )
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

async fn create_attempt(
    pool: &PgPool,
    user_id: i64,
    assigned_set: &str,
) -> Result<Option<ExamAttempt>, AppError> {
    // The partial unique index allows one open attempt per user. A racing
    // start that loses the insert gets None and re-reads the winner's row.
    let attempt = sqlx::query_as::<_, ExamAttempt>(
        "INSERT INTO exam_attempts (user_id, status, assigned_set)
         VALUES ($1, 'started', $2)
         ON CONFLICT (user_id) WHERE status = 'started' DO NOTHING
         RETURNING id, user_id, status, assigned_set, score, total_questions, started_at, completed_at",
    )
    .bind(user_id)
    .bind(assigned_set)
    .fetch_optional(pool)
    .await?;
    Ok(attempt)
}

/// Starts a new attempt for the user, or resumes their current one.
///
/// A resumed open attempt is checked for drift: a blank `assigned_set`, or
/// one no longer in the valid pool (the admin deleted the set or emptied
/// it), is re-resolved in place under the same attempt id and `started_at`.
/// Attempts in a terminal state are returned unchanged; this operation
/// never resurrects a finished exam.
pub async fn start_or_resume_session(
    pool: &PgPool,
    cache: &Cache,
    user_id: i64,
) -> Result<ExamAttempt, AppError> {
    let existing = latest_attempt(pool, user_id).await?;
    let valid_sets = cached_valid_sets(pool, cache).await?;

    if let Some(attempt) = existing {
        if attempt.is_terminal() {
            return Ok(attempt);
        }

        let drifted = attempt.assigned_set.trim().is_empty()
            || !valid_sets.contains(&attempt.assigned_set);
        if !drifted {
            return Ok(attempt);
        }

        let new_set = choose_set(&mut rand::thread_rng(), &valid_sets, None);
        tracing::info!(
            "Re-assigning drifted attempt {} from \"{}\" to \"{}\"",
            attempt.id,
            attempt.assigned_set,
            new_set
        );

        // Guarded update: if the attempt advanced to a terminal state in
        // the meantime, leave it alone and return the current row.
        let updated = sqlx::query_as::<_, ExamAttempt>(
            "UPDATE exam_attempts
             SET assigned_set = $1
             WHERE id = $2 AND status = 'started'
             RETURNING id, user_id, status, assigned_set, score, total_questions, started_at, completed_at",
        )
        .bind(&new_set)
        .bind(attempt.id)
        .fetch_optional(pool)
        .await?;

        return match updated {
            Some(attempt) => Ok(attempt),
            None => find_attempt(pool, attempt.id)
                .await?
                .ok_or_else(|| AppError::NotFound("Attempt not found".to_string())),
        };
    }

    let assigned_set = choose_set(&mut rand::thread_rng(), &valid_sets, None);
    tracing::info!(
        "Starting attempt for user {} with set \"{}\" (pool: {:?})",
        user_id,
        assigned_set,
        valid_sets
    );

    match create_attempt(pool, user_id, &assigned_set).await? {
        Some(attempt) => Ok(attempt),
        // Lost the creation race; the concurrent call's attempt is ours too.
        None => latest_attempt(pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string())),
    }
}

/// Questions to serve for an attempt, answers omitted.
///
/// An unknown attempt id yields an empty list, not an error: the caller
/// renders "no exam available" and sends the student back to start.
pub async fn fetch_deliverable_questions(
    pool: &PgPool,
    cache: &Cache,
    attempt_id: i64,
) -> Result<Vec<DeliverableQuestion>, AppError> {
    let Some(attempt) = find_attempt(pool, attempt_id).await? else {
        return Ok(Vec::new());
    };
    cached_questions_for_set(pool, cache, &attempt.assigned_set).await
}

/// Scores and finalizes an attempt. `outcome` distinguishes a normal
/// submission from an anti-cheat termination; both are terminal.
///
/// Scoring runs against the answer-bearing cache entry for the attempt's
/// set, so thousands of near-simultaneous submissions cost one store read.
/// Submitting an attempt that is already terminal is rejected with
/// Conflict; the status check is a WHERE guard on the final UPDATE, so a
/// lost race is indistinguishable from a late retry and equally harmless.
pub async fn submit_session(
    pool: &PgPool,
    cache: &Cache,
    attempt_id: i64,
    answers: &HashMap<i64, i32>,
    outcome: Outcome,
) -> Result<ExamAttempt, AppError> {
    let attempt = find_attempt(pool, attempt_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.is_terminal() {
        return Err(AppError::Conflict("Attempt already submitted".to_string()));
    }

    let questions = cached_questions_with_answers(pool, cache, &attempt.assigned_set).await?;
    let (score, total) = score_answers(answers, &questions);

    let updated = sqlx::query_as::<_, ExamAttempt>(
        "UPDATE exam_attempts
         SET score = $1, total_questions = $2, status = $3, completed_at = NOW()
         WHERE id = $4 AND status = 'started'
         RETURNING id, user_id, status, assigned_set, score, total_questions, started_at, completed_at",
    )
    .bind(score)
    .bind(total)
    .bind(outcome.as_status())
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;

    updated.ok_or_else(|| AppError::Conflict("Attempt already submitted".to_string()))
}

/// Admin reset: supersedes the user's current attempt with a fresh one.
///
/// The old row is physically deleted so clients holding its id get a clean
/// NotFound instead of stale state, and the new attempt is assigned a
/// different set whenever an alternative exists. Question data is
/// untouched, so no cache invalidation happens here.
pub async fn reset_session(
    pool: &PgPool,
    cache: &Cache,
    user_id: i64,
) -> Result<ResetOutcome, AppError> {
    let Some(attempt) = latest_attempt(pool, user_id).await? else {
        return Ok(ResetOutcome {
            ok: false,
            message: Some("No exam attempt found".to_string()),
        });
    };

    let previous_set = attempt.assigned_set.clone();

    sqlx::query("DELETE FROM exam_attempts WHERE id = $1")
        .bind(attempt.id)
        .execute(pool)
        .await?;

    let valid_sets = cached_valid_sets(pool, cache).await?;
    let previous = match previous_set.trim() {
        "" => None,
        set => Some(set),
    };
    let assigned_set = choose_set(&mut rand::thread_rng(), &valid_sets, previous);

    tracing::info!(
        "Reset exam for user {}: superseded attempt {} (\"{}\"), new set \"{}\"",
        user_id,
        attempt.id,
        previous_set,
        assigned_set
    );

    create_attempt(pool, user_id, &assigned_set).await?;

    Ok(ResetOutcome {
        ok: true,
        message: None,
    })
}
