// src/exam/mod.rs

pub mod assign;
pub mod scoring;
pub mod session;
