// src/models/question.rs

use serde::{Deserialize, Serialize};

/// Question kind tag: 'standard', 'list', 'missing_word' or 'negative'.
/// Informational only: the allocator treats all kinds alike; callers may
/// restrict the candidate pool to certain kinds before allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Standard,
    List,
    MissingWord,
    Negative,
}

/// One labeled choice within a question's option set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Label the user submits when choosing this option, e.g. "A".
    pub label: String,

    pub text: String,
}

/// A candidate exam question, belonging to exactly one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Owning topic.
    pub topic_id: i64,

    pub question_type: QuestionType,

    /// The text content of the question.
    pub content: String,

    /// 2 to 5 labeled choices.
    pub options: Vec<AnswerOption>,

    /// Label of the correct option.
    pub correct_label: String,

    /// Explanation or analysis of the correct answer, shown after grading.
    pub explanation: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to the client (excludes the answer key and
/// explanation).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub topic_id: i64,
    pub question_type: QuestionType,
    pub content: String,
    pub options: Vec<AnswerOption>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            topic_id: q.topic_id,
            question_type: q.question_type,
            content: q.content.clone(),
            options: q.options.clone(),
        }
    }
}
