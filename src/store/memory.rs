// src/store/memory.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::ExamError,
    models::{
        question::{Question, QuestionType},
        session::{ExamItem, ExamSession, NewExamSession},
        topic::Topic,
    },
    store::{AnswerKey, CatalogStore, FinishCommit, ItemVerdict, SessionStore},
};

/// In-process implementation of both store traits.
///
/// Cloning is cheap and shares the underlying state, so the same handle
/// can serve as catalog and session store at once. Deployments back the
/// same traits with their own database; this one serves embedding callers
/// and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Topics by category id.
    topics: HashMap<i64, Vec<Topic>>,
    questions: Vec<Question>,
    sessions: HashMap<i64, ExamSession>,
    next_session_id: i64,
    next_item_id: i64,
}

fn missing_session(session_id: i64) -> ExamError {
    ExamError::NotFound(format!("exam session {} not found", session_id))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers topics under one category.
    pub async fn seed_topics(&self, category_id: i64, topics: Vec<Topic>) {
        let mut inner = self.inner.lock().await;
        inner.topics.entry(category_id).or_default().extend(topics);
    }

    pub async fn seed_questions(&self, questions: Vec<Question>) {
        self.inner.lock().await.questions.extend(questions);
    }

    /// Snapshot of one session, for assertions and diagnostics.
    pub async fn session(&self, session_id: i64) -> Option<ExamSession> {
        self.inner.lock().await.sessions.get(&session_id).cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn fetch_topics(&self, category_id: i64) -> Result<Vec<Topic>, ExamError> {
        let inner = self.inner.lock().await;
        Ok(inner.topics.get(&category_id).cloned().unwrap_or_default())
    }

    async fn fetch_questions(
        &self,
        topic_ids: &[i64],
        type_filter: Option<&[QuestionType]>,
    ) -> Result<Vec<Question>, ExamError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .questions
            .iter()
            .filter(|q| topic_ids.contains(&q.topic_id))
            .filter(|q| type_filter.is_none_or(|kinds| kinds.contains(&q.question_type)))
            .cloned()
            .collect())
    }

    async fn fetch_questions_by_ids(
        &self,
        question_ids: &[i64],
    ) -> Result<Vec<Question>, ExamError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .questions
            .iter()
            .filter(|q| question_ids.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn fetch_answer_keys(&self, question_ids: &[i64]) -> Result<Vec<AnswerKey>, ExamError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .questions
            .iter()
            .filter(|q| question_ids.contains(&q.id))
            .map(|q| AnswerKey {
                id: q.id,
                answer: q.correct_label.clone(),
                topic_id: q.topic_id,
            })
            .collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, new: NewExamSession) -> Result<ExamSession, ExamError> {
        let mut inner = self.inner.lock().await;
        inner.next_session_id += 1;
        let session_id = inner.next_session_id;

        let mut items = Vec::with_capacity(new.question_ids.len());
        for (idx, &question_id) in new.question_ids.iter().enumerate() {
            inner.next_item_id += 1;
            items.push(ExamItem {
                id: inner.next_item_id,
                session_id,
                question_id,
                position: idx as u32 + 1,
                submitted_label: None,
                correct: None,
                answered_at: None,
            });
        }

        let session = ExamSession {
            id: session_id,
            owner_id: new.owner_id,
            mode: new.mode,
            duration_minutes: new.duration_minutes,
            items,
            created_at: new.created_at,
            started_at: None,
            finished_at: None,
            score: None,
            completed: false,
        };
        inner.sessions.insert(session_id, session.clone());
        Ok(session)
    }

    async fn fetch_session(&self, session_id: i64) -> Result<Option<ExamSession>, ExamError> {
        Ok(self.inner.lock().await.sessions.get(&session_id).cloned())
    }

    async fn update_started_at(
        &self,
        session_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), ExamError> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| missing_session(session_id))?;
        session.started_at = Some(started_at);
        Ok(())
    }

    async fn record_answer(
        &self,
        session_id: i64,
        position: u32,
        option_label: String,
        answered_at: DateTime<Utc>,
    ) -> Result<(), ExamError> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| missing_session(session_id))?;

        // Checked under the same lock that commit_finish takes, so an
        // answer can never slip into a sealed session.
        if session.completed {
            return Err(ExamError::State("exam already completed".to_string()));
        }

        let item = session
            .items
            .iter_mut()
            .find(|i| i.position == position)
            .ok_or_else(|| {
                ExamError::NotFound(format!(
                    "item {} not found in exam session {}",
                    position, session_id
                ))
            })?;
        item.submitted_label = Some(option_label);
        item.answered_at = Some(answered_at);
        Ok(())
    }

    async fn grade_items(
        &self,
        session_id: i64,
        verdicts: &[ItemVerdict],
    ) -> Result<(), ExamError> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| missing_session(session_id))?;

        // A sealed session is immutable. A racing finisher carries the
        // same verdicts anyway; dropping them lets it proceed to
        // commit_finish and pick up the committed result.
        if session.completed {
            return Ok(());
        }

        for verdict in verdicts {
            if let Some(item) = session
                .items
                .iter_mut()
                .find(|i| i.position == verdict.position)
            {
                item.correct = Some(verdict.correct);
            }
        }
        Ok(())
    }

    async fn commit_finish(
        &self,
        session_id: i64,
        score: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<FinishCommit, ExamError> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| missing_session(session_id))?;

        if session.completed {
            return Ok(FinishCommit::AlreadyCompleted {
                score: session.score.unwrap_or(0),
                finished_at: session.finished_at.unwrap_or(finished_at),
            });
        }

        session.score = Some(score);
        session.finished_at = Some(finished_at);
        session.completed = true;
        Ok(FinishCommit::Committed { finished_at })
    }
}
