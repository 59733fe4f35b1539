// src/config.rs

use std::env;

use dotenvy::dotenv;

/// Demo exams never exceed this many questions, whatever the product
/// configures.
pub const DEMO_QUESTION_CAP: usize = 20;

/// Reloading a session with zero recorded answers more than this many
/// seconds after its timer epoch restarts the countdown instead of
/// resuming it.
pub const START_GRACE_SECS: i64 = 120;

/// Engine-level defaults. Individual requests may override both fields.
#[derive(Debug, Clone)]
pub struct ExamConfig {
    /// Question count for standard exams whose product does not specify
    /// one.
    pub default_question_count: usize,

    /// Countdown length for sessions that do not carry their own.
    pub duration_minutes: i64,
}

impl ExamConfig {
    /// Reads overrides from the environment, falling back to the
    /// defaults.
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        let default_question_count = env::var("EXAM_QUESTION_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_question_count);

        let duration_minutes = env::var("EXAM_DURATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.duration_minutes);

        Self {
            default_question_count,
            duration_minutes,
        }
    }
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            default_question_count: 60,
            duration_minutes: 90,
        }
    }
}
