// src/models/exam_attempt.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Attempt status values. Plain strings in the database, constrained by a
/// CHECK; `started` is the only non-terminal state.
pub mod status {
    pub const STARTED: &str = "started";
    pub const COMPLETED: &str = "completed";
    pub const TERMINATED: &str = "terminated";
}

/// Represents the 'exam_attempts' table in the database.
///
/// The logical current attempt for a user is the most recently started row.
/// History is retained; rows are physically deleted only by an admin reset,
/// which supersedes the attempt under a fresh id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: i64,
    pub user_id: i64,

    /// 'started', 'completed' or 'terminated'.
    pub status: String,

    /// Name of the question set this attempt is bound to. May go stale if
    /// an admin deletes the set mid-exam; the session engine re-resolves
    /// it on the next start call.
    pub assigned_set: String,

    pub score: i32,
    pub total_questions: i32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ExamAttempt {
    pub fn is_terminal(&self) -> bool {
        self.status != status::STARTED
    }
}

/// How an attempt ends: a normal submission or an anti-cheat termination.
/// The termination signal comes from outside this core (UI proctoring).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Terminated,
}

impl Outcome {
    pub fn as_status(self) -> &'static str {
        match self {
            Outcome::Completed => status::COMPLETED,
            Outcome::Terminated => status::TERMINATED,
        }
    }
}

/// DTO for submitting an exam attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitExamRequest {
    pub attempt_id: i64,

    /// Question ID -> selected 0-based option index.
    pub answers: HashMap<i64, i32>,

    pub outcome: Outcome,
}

/// Result of an admin-initiated exam reset.
#[derive(Debug, Serialize)]
pub struct ResetOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
