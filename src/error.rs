// src/error.rs

use std::fmt;

/// Engine-wide error enum.
/// Centralizes the failure taxonomy so the transport collaborator can map
/// variants onto its own status codes.
#[derive(Debug)]
pub enum ExamError {
    /// Resolved inputs are unusable ("no topics found", "no questions
    /// found"). Raised before any state is created.
    Configuration(String),

    /// Operation invoked against a session in the wrong state, e.g.
    /// submitting an answer to a completed exam.
    State(String),

    /// Unknown session or item.
    NotFound(String),

    /// Request failed validation.
    Validation(String),

    /// Backing-store failure. A failed finish is retryable as a whole.
    Storage(String),
}

impl fmt::Display for ExamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            ExamError::State(msg) => write!(f, "invalid state: {}", msg),
            ExamError::NotFound(msg) => write!(f, "not found: {}", msg),
            ExamError::Validation(msg) => write!(f, "validation error: {}", msg),
            ExamError::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for ExamError {}

/// Allows using the `?` operator on request validation.
impl From<validator::ValidationErrors> for ExamError {
    fn from(err: validator::ValidationErrors) -> Self {
        ExamError::Validation(err.to_string())
    }
}
