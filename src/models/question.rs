// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'questions' table in the database.
///
/// This is the answer-bearing form: it carries `correct_option` and is only
/// ever used for scoring and admin views, never returned to a student-facing
/// question-delivery caller (see [`DeliverableQuestion`]).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    pub question_text: String,

    /// Ordered answer options (at least 4).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// 0-based index into `options`.
    pub correct_option: i32,

    /// The set this question belongs to. Membership is by name match,
    /// not by foreign key; deleting a set cascades by this string.
    pub set_name: String,

    /// Presentation grouping within the set; drives delivery ordering only.
    pub section_name: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Student-facing question DTO: the answer field is projected out at the
/// query level, so it can never leak through serialization.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliverableQuestion {
    pub id: i64,
    pub question_text: String,
    pub options: Json<Vec<String>>,
    pub section_name: String,
}

/// DTO for creating or updating a question.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_question))]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 2000, message = "Question text cannot be empty."))]
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: i32,
    pub set_name: Option<String>,
    pub section_name: Option<String>,
}

impl QuestionRequest {
    /// Empty or whitespace-only set/section names fall back to defaults.
    pub fn clean_set_name(&self) -> String {
        match self.set_name.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => "Default Set".to_string(),
        }
    }

    pub fn clean_section_name(&self) -> String {
        match self.section_name.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => "General".to_string(),
        }
    }
}

fn validate_question(req: &QuestionRequest) -> Result<(), validator::ValidationError> {
    if req.options.len() < 4 {
        return Err(validator::ValidationError::new("at_least_four_options"));
    }
    if req.options.iter().any(|opt| opt.trim().is_empty()) {
        return Err(validator::ValidationError::new("option_cannot_be_empty"));
    }
    if req.correct_option < 0 || req.correct_option as usize >= req.options.len() {
        return Err(validator::ValidationError::new("correct_option_out_of_range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: Vec<&str>, correct: i32) -> QuestionRequest {
        QuestionRequest {
            question_text: "What is 2 + 2?".to_string(),
            options: options.into_iter().map(String::from).collect(),
            correct_option: correct,
            set_name: None,
            section_name: None,
        }
    }

    #[test]
    fn accepts_four_options_with_valid_index() {
        assert!(request(vec!["1", "2", "3", "4"], 3).validate().is_ok());
    }

    #[test]
    fn rejects_fewer_than_four_options() {
        assert!(request(vec!["1", "2", "3"], 0).validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_correct_option() {
        assert!(request(vec!["1", "2", "3", "4"], 4).validate().is_err());
        assert!(request(vec!["1", "2", "3", "4"], -1).validate().is_err());
    }

    #[test]
    fn blank_set_name_falls_back_to_default() {
        let mut req = request(vec!["1", "2", "3", "4"], 0);
        req.set_name = Some("   ".to_string());
        assert_eq!(req.clean_set_name(), "Default Set");
        assert_eq!(req.clean_section_name(), "General");
    }
}
