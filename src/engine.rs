// src/engine.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::Mutex;
use validator::Validate;

use crate::{
    allocator::{self, CandidatePool, OrderingMode},
    config::{DEMO_QUESTION_CAP, ExamConfig, START_GRACE_SECS},
    error::ExamError,
    models::{
        question::{PublicQuestion, Question},
        session::{
            CreateExamRequest, ExamItem, ExamMode, ExamSession, FinishReport, NewExamSession,
            SessionClock, TopicBreakdown,
        },
    },
    store::{AnswerKey, CatalogStore, FinishCommit, ItemVerdict, SessionStore},
};

/// Orchestrates exam attempts over narrow storage seams.
///
/// The question set is assembled once at creation and never changes;
/// answers may be submitted and overwritten freely until the attempt is
/// finished, at which point it is graded exactly once and sealed.
pub struct ExamEngine<C, S> {
    catalog: C,
    sessions: S,
    config: ExamConfig,
    rng: Mutex<StdRng>,
}

impl<C: CatalogStore, S: SessionStore> ExamEngine<C, S> {
    pub fn new(catalog: C, sessions: S, config: ExamConfig) -> Self {
        Self {
            catalog,
            sessions,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeds the internal generator so assemblies are reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Creates one exam attempt: resolves the topic set and candidate
    /// pool, allocates the question selection, and persists the session
    /// with its items in selection order.
    ///
    /// Fails without creating anything when the resolved topic set or
    /// pool is empty. A pool smaller than the target count is accepted;
    /// the exam simply has fewer items.
    pub async fn create(&self, req: CreateExamRequest) -> Result<ExamSession, ExamError> {
        req.validate()?;

        let topics = self.catalog.fetch_topics(req.category_id).await?;
        if topics.is_empty() {
            return Err(ExamError::Configuration("no topics found".to_string()));
        }

        let topic_ids: Vec<i64> = topics.iter().map(|t| t.id).collect();
        let questions = self
            .catalog
            .fetch_questions(&topic_ids, req.type_filter.as_deref())
            .await?;
        if questions.is_empty() {
            return Err(ExamError::Configuration("no questions found".to_string()));
        }

        let mut pool = CandidatePool::new();
        for question in questions {
            pool.entry(question.topic_id).or_default().push(question);
        }

        let target_count = self.resolve_target_count(&req)?;
        let ordering = req.ordering.unwrap_or(match req.mode {
            ExamMode::Practice => OrderingMode::GroupedByTopicWeightDesc,
            ExamMode::Standard | ExamMode::Demo => OrderingMode::FullyShuffled,
        });

        let selection = {
            let mut rng = self.rng.lock().await;
            allocator::allocate(&topics, &pool, target_count, ordering, &mut *rng)
        };
        if selection.len() < target_count {
            tracing::warn!(
                "Candidate pool only covers {} of {} requested questions",
                selection.len(),
                target_count
            );
        }

        let session = self
            .sessions
            .insert_session(NewExamSession {
                owner_id: req.owner_id,
                mode: req.mode,
                duration_minutes: req.duration_minutes.unwrap_or(self.config.duration_minutes),
                question_ids: selection,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            "Created exam session {} for user {} with {} items",
            session.id,
            session.owner_id,
            session.items.len()
        );
        Ok(session)
    }

    /// Explicitly starts the countdown. A second call keeps the original
    /// epoch.
    pub async fn start(&self, session_id: i64) -> Result<SessionClock, ExamError> {
        let session = self.require_session(session_id).await?;
        if session.completed {
            return Err(ExamError::State("exam already completed".to_string()));
        }

        let now = Utc::now();
        let epoch = match session.started_at {
            Some(epoch) => epoch,
            None => {
                self.sessions.update_started_at(session_id, now).await?;
                now
            }
        };
        Ok(clock_for(&session, epoch, now, false))
    }

    /// Reloads a session mid-attempt and decides whether the countdown
    /// resumes or starts over (see [`resolve_timer_epoch`]).
    pub async fn resume(&self, session_id: i64) -> Result<SessionClock, ExamError> {
        let session = self.require_session(session_id).await?;
        if session.completed {
            return Err(ExamError::State("exam already completed".to_string()));
        }

        let now = Utc::now();
        match resolve_timer_epoch(session.started_at, session.answered_count(), now) {
            TimerEpoch::NotStarted => {
                self.sessions.update_started_at(session_id, now).await?;
                Ok(clock_for(&session, now, now, false))
            }
            TimerEpoch::Restart => {
                tracing::info!(
                    "Exam session {} reopened after the grace window with no answers; restarting timer",
                    session_id
                );
                self.sessions.update_started_at(session_id, now).await?;
                Ok(clock_for(&session, now, now, true))
            }
            TimerEpoch::Resume(epoch) => Ok(clock_for(&session, epoch, now, false)),
        }
    }

    /// Read-only countdown state, recomputed from the persisted epoch.
    /// `remaining_seconds == 0` is the caller's cue to finish with
    /// `auto = true`; expiry is a derived fact, not a scheduled event.
    pub async fn clock(&self, session_id: i64) -> Result<SessionClock, ExamError> {
        let session = self.require_session(session_id).await?;
        let now = Utc::now();
        let epoch = session.started_at.unwrap_or(now);
        Ok(clock_for(&session, epoch, now, false))
    }

    /// The session's questions in item order, answer keys stripped, for
    /// rendering by the caller.
    pub async fn paper(&self, session_id: i64) -> Result<Vec<PublicQuestion>, ExamError> {
        let session = self.require_session(session_id).await?;
        let ids: Vec<i64> = session.items.iter().map(|i| i.question_id).collect();
        let questions = self.catalog.fetch_questions_by_ids(&ids).await?;
        let by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();
        Ok(session
            .items
            .iter()
            .filter_map(|i| by_id.get(&i.question_id).map(PublicQuestion::from))
            .collect())
    }

    /// Records a choice for one item. Resubmission overwrites the prior
    /// choice. Correctness is only computed at finish, so answers can
    /// change freely until then.
    pub async fn submit_answer(
        &self,
        session_id: i64,
        position: u32,
        option_label: &str,
    ) -> Result<(), ExamError> {
        // The authoritative completed check lives inside the store's
        // consistency boundary (record_answer re-checks under its own
        // lock); this one fails fast on a stale session.
        let session = self.require_session(session_id).await?;
        if session.completed {
            return Err(ExamError::State("exam already completed".to_string()));
        }

        self.sessions
            .record_answer(session_id, position, option_label.to_string(), Utc::now())
            .await
    }

    /// Grades the attempt and seals it.
    ///
    /// The first caller to win the compare-and-set on the completed flag
    /// performs the scoring; every later call (including a finish on an
    /// already-completed session) gets the committed result back
    /// unchanged. Per-item grades land before the aggregate commit, so a
    /// failure in between leaves a retryable, not corrupted, record.
    ///
    /// `auto` distinguishes a timeout from a manual submission in the
    /// caller-facing message; scoring is identical.
    pub async fn finish(&self, session_id: i64, auto: bool) -> Result<FinishReport, ExamError> {
        let session = self.require_session(session_id).await?;
        let question_ids: Vec<i64> = session.items.iter().map(|i| i.question_id).collect();
        let keys = answer_key_map(self.catalog.fetch_answer_keys(&question_ids).await?);

        if session.completed {
            return Ok(completed_report(&session, &keys));
        }

        let (verdicts, score) = grade_items(&session.items, &keys);

        self.sessions.grade_items(session_id, &verdicts).await?;

        match self
            .sessions
            .commit_finish(session_id, score, Utc::now())
            .await?
        {
            FinishCommit::Committed { finished_at } => {
                tracing::info!(
                    "Exam session {} graded: {}/{} correct",
                    session_id,
                    score,
                    session.items.len()
                );
                Ok(FinishReport {
                    session_id,
                    score,
                    total_questions: session.items.len(),
                    finished_at,
                    per_topic: topic_breakdown(&verdicts, &keys),
                    message: finish_message(auto).to_string(),
                })
            }
            FinishCommit::AlreadyCompleted { .. } => {
                tracing::warn!(
                    "Finish raced on exam session {}; returning the committed result",
                    session_id
                );
                let session = self.require_session(session_id).await?;
                Ok(completed_report(&session, &keys))
            }
        }
    }

    fn resolve_target_count(&self, req: &CreateExamRequest) -> Result<usize, ExamError> {
        let configured = req
            .question_count
            .map(|c| c as usize)
            .unwrap_or(self.config.default_question_count);
        match req.mode {
            ExamMode::Standard => Ok(configured),
            ExamMode::Demo => Ok(configured.min(DEMO_QUESTION_CAP)),
            ExamMode::Practice => match req.question_count {
                Some(count) => Ok(count as usize),
                None => Err(ExamError::Validation(
                    "practice mode requires a question count".to_string(),
                )),
            },
        }
    }

    async fn require_session(&self, session_id: i64) -> Result<ExamSession, ExamError> {
        self.sessions
            .fetch_session(session_id)
            .await?
            .ok_or_else(|| ExamError::NotFound(format!("exam session {} not found", session_id)))
    }
}

/// Disposition of the timer epoch when a session is reloaded.
#[derive(Debug, PartialEq, Eq)]
enum TimerEpoch {
    /// Countdown has never started.
    NotStarted,

    /// Keep counting from the stored epoch.
    Resume(DateTime<Utc>),

    /// Opened, abandoned before the first answer, reopened late: restart
    /// the countdown from now.
    Restart,
}

/// Decides whether a reloaded session resumes its countdown or starts
/// over.
///
/// Policy: a session reopened with zero answers recorded more than
/// `START_GRACE_SECS` after its epoch is treated as never actually begun
/// and gets a fresh epoch. Any recorded answer, or a reload within the
/// window, resumes from the stored epoch so a reload never grants extra
/// time.
fn resolve_timer_epoch(
    started_at: Option<DateTime<Utc>>,
    answered_count: usize,
    now: DateTime<Utc>,
) -> TimerEpoch {
    match started_at {
        None => TimerEpoch::NotStarted,
        Some(epoch) => {
            let elapsed = (now - epoch).num_seconds();
            if answered_count == 0 && elapsed > START_GRACE_SECS {
                TimerEpoch::Restart
            } else {
                TimerEpoch::Resume(epoch)
            }
        }
    }
}

fn clock_for(
    session: &ExamSession,
    epoch: DateTime<Utc>,
    now: DateTime<Utc>,
    restarted: bool,
) -> SessionClock {
    let duration_seconds = session.duration_minutes * 60;
    let elapsed = (now - epoch).num_seconds().max(0);
    SessionClock {
        session_id: session.id,
        started_at: epoch,
        duration_seconds,
        remaining_seconds: (duration_seconds - elapsed).max(0),
        restarted,
    }
}

fn answer_key_map(keys: Vec<AnswerKey>) -> HashMap<i64, AnswerKey> {
    keys.into_iter().map(|k| (k.id, k)).collect()
}

/// Compares each item's submitted label against the authoritative key.
/// Unanswered items count as incorrect. Returns the per-item verdicts and
/// the aggregate score (count of correct items).
fn grade_items(items: &[ExamItem], keys: &HashMap<i64, AnswerKey>) -> (Vec<ItemVerdict>, i64) {
    let mut score = 0;
    let verdicts = items
        .iter()
        .map(|item| {
            // Strict label matching, same as the submission side.
            let correct = match (&item.submitted_label, keys.get(&item.question_id)) {
                (Some(label), Some(key)) => label == &key.answer,
                _ => false,
            };
            if correct {
                score += 1;
            }
            ItemVerdict {
                position: item.position,
                question_id: item.question_id,
                correct,
            }
        })
        .collect();
    (verdicts, score)
}

/// Aggregates verdicts into per-topic correct/total counts, ordered by
/// topic id.
fn topic_breakdown(
    verdicts: &[ItemVerdict],
    keys: &HashMap<i64, AnswerKey>,
) -> Vec<TopicBreakdown> {
    let mut by_topic: BTreeMap<i64, TopicBreakdown> = BTreeMap::new();
    for verdict in verdicts {
        let Some(key) = keys.get(&verdict.question_id) else {
            continue;
        };
        let entry = by_topic.entry(key.topic_id).or_insert(TopicBreakdown {
            topic_id: key.topic_id,
            correct: 0,
            total: 0,
        });
        entry.total += 1;
        if verdict.correct {
            entry.correct += 1;
        }
    }
    by_topic.into_values().collect()
}

/// Report for a session that is already sealed, rebuilt from the
/// persisted per-item grades. Score and finish timestamp are exactly the
/// committed ones.
fn completed_report(session: &ExamSession, keys: &HashMap<i64, AnswerKey>) -> FinishReport {
    let verdicts: Vec<ItemVerdict> = session
        .items
        .iter()
        .map(|item| ItemVerdict {
            position: item.position,
            question_id: item.question_id,
            correct: item.correct.unwrap_or(false),
        })
        .collect();
    FinishReport {
        session_id: session.id,
        score: session.score.unwrap_or(0),
        total_questions: session.items.len(),
        finished_at: session.finished_at.unwrap_or(session.created_at),
        per_topic: topic_breakdown(&verdicts, keys),
        message: "Exam already completed.".to_string(),
    }
}

fn finish_message(auto: bool) -> &'static str {
    if auto {
        "Time's up, submitting automatically."
    } else {
        "Submitting your answers."
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn item(position: u32, question_id: i64, submitted: Option<&str>) -> ExamItem {
        ExamItem {
            id: position as i64,
            session_id: 1,
            question_id,
            position,
            submitted_label: submitted.map(str::to_string),
            correct: None,
            answered_at: None,
        }
    }

    fn key(id: i64, answer: &str, topic_id: i64) -> AnswerKey {
        AnswerKey {
            id,
            answer: answer.to_string(),
            topic_id,
        }
    }

    #[test]
    fn grading_counts_exact_matches_only() {
        let items = vec![
            item(1, 101, Some("A")),
            item(2, 102, Some("B")),
            item(3, 103, None),
        ];
        let keys = answer_key_map(vec![
            key(101, "A", 1),
            key(102, "A", 1),
            key(103, "C", 2),
        ]);

        let (verdicts, score) = grade_items(&items, &keys);

        assert_eq!(score, 1);
        assert!(verdicts[0].correct);
        assert!(!verdicts[1].correct);
        assert!(!verdicts[2].correct);
    }

    #[test]
    fn grading_treats_unknown_question_as_incorrect() {
        let items = vec![item(1, 999, Some("A"))];
        let keys = answer_key_map(vec![key(101, "A", 1)]);

        let (verdicts, score) = grade_items(&items, &keys);

        assert_eq!(score, 0);
        assert!(!verdicts[0].correct);
    }

    #[test]
    fn breakdown_groups_by_topic() {
        let items = vec![
            item(1, 101, Some("A")),
            item(2, 102, Some("B")),
            item(3, 103, Some("C")),
        ];
        let keys = answer_key_map(vec![
            key(101, "A", 1),
            key(102, "A", 1),
            key(103, "C", 2),
        ]);

        let (verdicts, _) = grade_items(&items, &keys);
        let breakdown = topic_breakdown(&verdicts, &keys);

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].topic_id, 1);
        assert_eq!(breakdown[0].correct, 1);
        assert_eq!(breakdown[0].total, 2);
        assert_eq!(breakdown[1].topic_id, 2);
        assert_eq!(breakdown[1].correct, 1);
        assert_eq!(breakdown[1].total, 1);
    }

    #[test]
    fn timer_epoch_not_started() {
        let now = Utc::now();
        assert_eq!(resolve_timer_epoch(None, 0, now), TimerEpoch::NotStarted);
    }

    #[test]
    fn timer_epoch_resumes_within_grace_window() {
        let now = Utc::now();
        let epoch = now - Duration::seconds(START_GRACE_SECS - 30);
        assert_eq!(
            resolve_timer_epoch(Some(epoch), 0, now),
            TimerEpoch::Resume(epoch)
        );
    }

    #[test]
    fn timer_epoch_restarts_abandoned_session() {
        let now = Utc::now();
        let epoch = now - Duration::seconds(START_GRACE_SECS + 30);
        assert_eq!(
            resolve_timer_epoch(Some(epoch), 0, now),
            TimerEpoch::Restart
        );
    }

    #[test]
    fn timer_epoch_resumes_once_answers_exist() {
        let now = Utc::now();
        let epoch = now - Duration::minutes(30);
        assert_eq!(
            resolve_timer_epoch(Some(epoch), 3, now),
            TimerEpoch::Resume(epoch)
        );
    }
}
