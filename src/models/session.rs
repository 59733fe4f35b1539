// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::allocator::OrderingMode;
use crate::models::question::QuestionType;

/// Exam variant. Affects the requested question count and post-completion
/// routing only, never the allocation algorithm itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamMode {
    Standard,
    Demo,
    Practice,
}

/// One timed, graded exam attempt.
///
/// The item sequence is fixed at creation and never reordered or resized
/// afterwards. Once `completed` is set the record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,

    pub owner_id: i64,

    pub mode: ExamMode,

    pub duration_minutes: i64,

    /// Items in position order, 1..N.
    pub items: Vec<ExamItem>,

    pub created_at: DateTime<Utc>,

    /// Timer epoch. None until the attempt is started.
    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Count of correctly answered items. None until graded.
    pub score: Option<i64>,

    pub completed: bool,
}

impl ExamSession {
    pub fn answered_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.submitted_label.is_some())
            .count()
    }
}

/// One question slot within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamItem {
    pub id: i64,

    pub session_id: i64,

    pub question_id: i64,

    /// 1-based position, matching the allocator's selection order.
    pub position: u32,

    /// The option label the user chose. None until answered.
    pub submitted_label: Option<String>,

    /// Graded correctness. None until the session is finished.
    pub correct: Option<bool>,

    pub answered_at: Option<DateTime<Utc>>,
}

/// DTO for creating a new exam attempt.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExamRequest {
    pub owner_id: i64,

    /// Exam category whose topics form the draw pool.
    pub category_id: i64,

    pub mode: ExamMode,

    /// Standard: the product-configured count (engine default when
    /// absent). Demo: capped at `DEMO_QUESTION_CAP`. Practice: required.
    #[validate(range(min = 1, max = 500))]
    pub question_count: Option<u32>,

    /// Restrict the candidate pool to these question kinds.
    pub type_filter: Option<Vec<QuestionType>>,

    /// Defaults by mode: practice sessions group by topic weight, catalog
    /// exams shuffle fully.
    pub ordering: Option<OrderingMode>,

    #[validate(range(min = 1, max = 480))]
    pub duration_minutes: Option<i64>,
}

/// Fields persisted when a session is created. The store assigns ids and
/// lays the items out in `question_ids` order.
#[derive(Debug, Clone)]
pub struct NewExamSession {
    pub owner_id: i64,
    pub mode: ExamMode,
    pub duration_minutes: i64,
    pub question_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// Countdown state, recomputed from persisted timestamps on every read so
/// a reload never grants extra time.
#[derive(Debug, Clone, Serialize)]
pub struct SessionClock {
    pub session_id: i64,

    /// Effective timer epoch.
    pub started_at: DateTime<Utc>,

    pub duration_seconds: i64,

    /// Zero means time is up; the caller finishes with `auto = true`.
    pub remaining_seconds: i64,

    /// True when the reload heuristic reset the timer epoch.
    pub restarted: bool,
}

/// Result of grading one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FinishReport {
    pub session_id: i64,

    /// Count of correctly answered items.
    pub score: i64,

    pub total_questions: usize,

    pub finished_at: DateTime<Utc>,

    pub per_topic: Vec<TopicBreakdown>,

    pub message: String,
}

/// Per-topic slice of a finish report.
#[derive(Debug, Clone, Serialize)]
pub struct TopicBreakdown {
    pub topic_id: i64,
    pub correct: i64,
    pub total: i64,
}
