// src/models/mod.rs

pub mod college;
pub mod department;
pub mod exam_attempt;
pub mod exam_config;
pub mod question;
pub mod question_set;
pub mod user;
