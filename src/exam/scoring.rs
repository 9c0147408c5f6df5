// src/exam/scoring.rs

use std::collections::HashMap;

use crate::models::question::Question;

/// Scores a set of answers against the authoritative question list.
///
/// Returns `(score, total)` where `total` is the length of the
/// authoritative list, not the number of answers supplied: partial and
/// empty submissions score against the true denominator. Answer entries
/// whose question id is not in the list (stale or forged ids) are
/// silently ignored.
///
/// Pure function: all data is passed in, nothing is read from the store
/// or cache.
pub fn score_answers(answers: &HashMap<i64, i32>, authoritative: &[Question]) -> (i32, i32) {
    let total = authoritative.len() as i32;
    let score = authoritative
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_option))
        .count() as i32;
    (score, total)
}
