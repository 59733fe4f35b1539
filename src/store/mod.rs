// src/store/mod.rs

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::ExamError,
    models::{
        question::{Question, QuestionType},
        session::{ExamSession, NewExamSession},
        topic::Topic,
    },
};

pub use memory::MemoryStore;

/// Answer key for one question, fetched in bulk at grading time.
#[derive(Debug, Clone)]
pub struct AnswerKey {
    pub id: i64,
    pub answer: String,
    pub topic_id: i64,
}

/// Correctness verdict for one item, written ahead of the finish commit.
#[derive(Debug, Clone)]
pub struct ItemVerdict {
    pub position: u32,
    pub question_id: i64,
    pub correct: bool,
}

/// Outcome of the compare-and-set that seals a session.
#[derive(Debug, Clone)]
pub enum FinishCommit {
    /// This caller won; the session is now completed.
    Committed { finished_at: DateTime<Utc> },

    /// Another caller already sealed the session; its result stands.
    AlreadyCompleted {
        score: i64,
        finished_at: DateTime<Utc>,
    },
}

/// Read-only access to the question catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All topics of one exam category.
    async fn fetch_topics(&self, category_id: i64) -> Result<Vec<Topic>, ExamError>;

    /// Candidate questions for the given topics, optionally restricted to
    /// certain question kinds.
    async fn fetch_questions(
        &self,
        topic_ids: &[i64],
        type_filter: Option<&[QuestionType]>,
    ) -> Result<Vec<Question>, ExamError>;

    async fn fetch_questions_by_ids(
        &self,
        question_ids: &[i64],
    ) -> Result<Vec<Question>, ExamError>;

    /// Authoritative correct options, loaded in bulk at grading time.
    async fn fetch_answer_keys(&self, question_ids: &[i64]) -> Result<Vec<AnswerKey>, ExamError>;
}

/// Persistence seam for exam sessions.
///
/// Implementations must enforce the completed check for every mutation
/// inside their own consistency boundary, so no write can race past a
/// concurrent finish.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a session with its items laid out in selection order,
    /// positions 1..N. All-or-nothing: no partial session on failure.
    async fn insert_session(&self, new: NewExamSession) -> Result<ExamSession, ExamError>;

    async fn fetch_session(&self, session_id: i64) -> Result<Option<ExamSession>, ExamError>;

    /// Rewrites the timer epoch (explicit start, or restart detection).
    async fn update_started_at(
        &self,
        session_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), ExamError>;

    /// Records one answer. Last write wins until the session is sealed.
    async fn record_answer(
        &self,
        session_id: i64,
        position: u32,
        option_label: String,
        answered_at: DateTime<Utc>,
    ) -> Result<(), ExamError>;

    /// Writes per-item correctness ahead of the finish commit.
    async fn grade_items(
        &self,
        session_id: i64,
        verdicts: &[ItemVerdict],
    ) -> Result<(), ExamError>;

    /// Compare-and-set on the completed flag. At most one caller ever
    /// observes [`FinishCommit::Committed`] for a given session.
    async fn commit_finish(
        &self,
        session_id: i64,
        score: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<FinishCommit, ExamError>;
}
