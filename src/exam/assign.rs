// src/exam/assign.rs

use rand::Rng;
use rand::seq::SliceRandom;

/// Fallback set name when no set currently has any questions.
pub const DEFAULT_SET: &str = "Default Set";

/// Picks the question set for an attempt.
///
/// `valid_sets` is the pool of set names that currently have at least one
/// question. `previous` is the set of the attempt being superseded (reset
/// flow); when at least one alternative exists the new assignment is
/// guaranteed to differ from it.
///
/// The RNG is injected so tests can drive this with a seeded generator.
pub fn choose_set<R: Rng + ?Sized>(
    rng: &mut R,
    valid_sets: &[String],
    previous: Option<&str>,
) -> String {
    match valid_sets {
        [] => DEFAULT_SET.to_string(),
        [only] => only.clone(),
        _ => {
            let pool: Vec<&String> = match previous {
                Some(prev) => valid_sets.iter().filter(|s| s.as_str() != prev).collect(),
                None => valid_sets.iter().collect(),
            };
            // The pool cannot be empty here: with >= 2 distinct sets,
            // excluding one still leaves at least one.
            pool.choose(rng)
                .map(|s| (*s).clone())
                .unwrap_or_else(|| DEFAULT_SET.to_string())
        }
    }
}
