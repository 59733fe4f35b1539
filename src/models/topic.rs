// src/models/topic.rs

use serde::{Deserialize, Serialize};

/// A syllabus subdivision questions are drawn from.
///
/// `weight` expresses the topic's relative share of an exam's questions.
/// Weights are compared against the sum over all topics and need not add
/// up to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,

    pub name: String,

    /// Grouping label, e.g. "Network Security".
    pub area: String,

    /// Non-negative relative importance. A zero-weight topic receives no
    /// proportional share and is only reachable through backfill.
    pub weight: f64,
}
