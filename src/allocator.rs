// src/allocator.rs

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::models::{question::Question, topic::Topic};

/// Candidate questions per topic id, assembled by the caller before
/// allocation. Topics absent from the map simply have nothing available.
pub type CandidatePool = HashMap<i64, Vec<Question>>;

/// How the final selection is ordered before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    /// One shuffle across the whole combined list.
    FullyShuffled,

    /// Topic blocks ordered by descending weight (ties keep insertion
    /// order), random order only within a block.
    GroupedByTopicWeightDesc,
}

/// Per-topic bookkeeping for one allocation run.
struct TopicShare<'a> {
    topic: &'a Topic,
    candidates: &'a [Question],
    count: usize,
    remainder: f64,
}

/// Computes per-topic question counts and draws the final selection.
///
/// Counts follow the largest-remainder method: every topic first receives
/// the floor of its ideal share (`weight / total_weight * target_count`),
/// leftover slots go to the largest fractional remainders, and any deficit
/// still open after that is backfilled from topics with spare capacity.
///
/// The function is total. A pool smaller than `target_count` degrades to
/// "return everything available"; callers that need an exact count compare
/// the result length themselves.
pub fn allocate<R: Rng>(
    topics: &[Topic],
    pool: &CandidatePool,
    target_count: usize,
    ordering: OrderingMode,
    rng: &mut R,
) -> Vec<i64> {
    let total_weight: f64 = topics.iter().map(|t| t.weight).sum();

    // Proportional phase. Topics with no candidates are skipped entirely;
    // they contribute nothing and consume no slots. An all-zero weight
    // vector skips the phase and leaves everything to backfill.
    let mut shares: Vec<TopicShare> = topics
        .iter()
        .filter_map(|topic| {
            let candidates = match pool.get(&topic.id) {
                Some(v) if !v.is_empty() => v.as_slice(),
                _ => return None,
            };
            let (count, remainder) = if total_weight > 0.0 {
                let ideal = topic.weight / total_weight * target_count as f64;
                let base = ideal.floor() as usize;
                (base.min(candidates.len()), ideal - ideal.floor())
            } else {
                (0, 0.0)
            };
            Some(TopicShare {
                topic,
                candidates,
                count,
                remainder,
            })
        })
        .collect();

    let allocated: usize = shares.iter().map(|s| s.count).sum();
    let mut deficit = target_count.saturating_sub(allocated);

    // Largest-remainder pass: a single walk, so a topic gains at most one
    // slot here. The sort is stable; remainder ties keep original topic
    // order.
    if deficit > 0 {
        let mut order: Vec<usize> = (0..shares.len()).collect();
        order.sort_by(|&a, &b| {
            shares[b]
                .remainder
                .partial_cmp(&shares[a].remainder)
                .unwrap_or(Ordering::Equal)
        });
        for idx in order {
            if deficit == 0 {
                break;
            }
            let share = &mut shares[idx];
            if share.count < share.candidates.len() {
                share.count += 1;
                deficit -= 1;
            }
        }
    }

    // Backfill pass: saturate topics in original order until the deficit
    // is gone or the whole pool is spoken for.
    if deficit > 0 {
        for share in shares.iter_mut() {
            let spare = share.candidates.len() - share.count;
            let take = spare.min(deficit);
            share.count += take;
            deficit -= take;
            if deficit == 0 {
                break;
            }
        }
    }

    // Draw: uniform selection without replacement, shuffle-and-slice per
    // topic.
    let mut blocks: Vec<(f64, Vec<i64>)> = Vec::with_capacity(shares.len());
    for share in &shares {
        let mut ids: Vec<i64> = share.candidates.iter().map(|q| q.id).collect();
        ids.shuffle(rng);
        ids.truncate(share.count);
        blocks.push((share.topic.weight, ids));
    }

    match ordering {
        OrderingMode::FullyShuffled => {
            let mut selection: Vec<i64> = blocks.into_iter().flat_map(|(_, ids)| ids).collect();
            selection.shuffle(rng);
            selection
        }
        OrderingMode::GroupedByTopicWeightDesc => {
            blocks.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
            blocks.into_iter().flat_map(|(_, ids)| ids).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::models::question::{AnswerOption, QuestionType};

    fn topic(id: i64, weight: f64) -> Topic {
        Topic {
            id,
            name: format!("Topic {}", id),
            area: "General".to_string(),
            weight,
        }
    }

    fn questions(topic_id: i64, count: usize) -> Vec<Question> {
        (0..count)
            .map(|n| Question {
                id: topic_id * 1000 + n as i64,
                topic_id,
                question_type: QuestionType::Standard,
                content: format!("Question {} of topic {}", n, topic_id),
                options: vec![
                    AnswerOption {
                        label: "A".to_string(),
                        text: "first".to_string(),
                    },
                    AnswerOption {
                        label: "B".to_string(),
                        text: "second".to_string(),
                    },
                ],
                correct_label: "A".to_string(),
                explanation: None,
                created_at: None,
            })
            .collect()
    }

    fn pool_of(sizes: &[(i64, usize)]) -> CandidatePool {
        sizes
            .iter()
            .map(|&(topic_id, count)| (topic_id, questions(topic_id, count)))
            .collect()
    }

    fn count_for_topic(selection: &[i64], topic_id: i64) -> usize {
        selection
            .iter()
            .filter(|&&id| id / 1000 == topic_id)
            .count()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn weighted_split_without_remainders() {
        // Ideal shares are exactly 6.0 and 2.0; no remainder phase needed.
        let topics = vec![topic(1, 3.0), topic(2, 1.0)];
        let pool = pool_of(&[(1, 10), (2, 10)]);

        let selection = allocate(&topics, &pool, 8, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 8);
        assert_eq!(count_for_topic(&selection, 1), 6);
        assert_eq!(count_for_topic(&selection, 2), 2);
    }

    #[test]
    fn remainders_fill_to_exact_count() {
        // 3 equal topics, target 10: floors give 3+3+3, the largest
        // remainders supply the last slot.
        let topics = vec![topic(1, 1.0), topic(2, 1.0), topic(3, 1.0)];
        let pool = pool_of(&[(1, 10), (2, 10), (3, 10)]);

        let selection = allocate(&topics, &pool, 10, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 10);
        for id in 1..=3 {
            let count = count_for_topic(&selection, id);
            assert!((3..=4).contains(&count), "topic {} got {}", id, count);
        }
    }

    #[test]
    fn no_duplicate_question_ids() {
        let topics = vec![topic(1, 2.0), topic(2, 1.0), topic(3, 1.0)];
        let pool = pool_of(&[(1, 6), (2, 6), (3, 6)]);

        let selection = allocate(&topics, &pool, 12, OrderingMode::FullyShuffled, &mut rng());

        let unique: HashSet<i64> = selection.iter().copied().collect();
        assert_eq!(unique.len(), selection.len());
    }

    #[test]
    fn exhausted_pool_returns_everything() {
        let topics = vec![topic(1, 1.0), topic(2, 1.0), topic(3, 1.0)];
        let pool = pool_of(&[(1, 1), (2, 1), (3, 1)]);

        let selection = allocate(&topics, &pool, 5, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 3);
    }

    #[test]
    fn under_stocked_topic_never_blocks_allocation() {
        // Topic 1 can only supply 2 of its ideal 4; topic 2 absorbs the
        // shortfall.
        let topics = vec![topic(1, 1.0), topic(2, 1.0)];
        let pool = pool_of(&[(1, 2), (2, 10)]);

        let selection = allocate(&topics, &pool, 8, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 8);
        assert_eq!(count_for_topic(&selection, 1), 2);
        assert_eq!(count_for_topic(&selection, 2), 6);
    }

    #[test]
    fn zero_weight_topic_only_receives_backfill() {
        let topics = vec![topic(1, 1.0), topic(2, 0.0)];
        let pool = pool_of(&[(1, 3), (2, 5)]);

        let selection = allocate(&topics, &pool, 5, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 5);
        assert_eq!(count_for_topic(&selection, 1), 3);
        assert_eq!(count_for_topic(&selection, 2), 2);
    }

    #[test]
    fn zero_total_weight_backfills_in_topic_order() {
        let topics = vec![topic(1, 0.0), topic(2, 0.0)];
        let pool = pool_of(&[(1, 4), (2, 4)]);

        let selection = allocate(&topics, &pool, 6, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 6);
        assert_eq!(count_for_topic(&selection, 1), 4);
        assert_eq!(count_for_topic(&selection, 2), 2);
    }

    #[test]
    fn empty_pool_topics_are_skipped() {
        let topics = vec![topic(1, 5.0), topic(2, 1.0)];
        let pool = pool_of(&[(2, 10)]);

        let selection = allocate(&topics, &pool, 6, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(selection.len(), 6);
        assert_eq!(count_for_topic(&selection, 2), 6);
    }

    #[test]
    fn target_zero_selects_nothing() {
        let topics = vec![topic(1, 1.0)];
        let pool = pool_of(&[(1, 5)]);

        let selection = allocate(&topics, &pool, 0, OrderingMode::FullyShuffled, &mut rng());

        assert!(selection.is_empty());
    }

    #[test]
    fn grouped_ordering_sorts_blocks_by_weight() {
        let topics = vec![topic(1, 1.0), topic(2, 5.0)];
        let pool = pool_of(&[(1, 4), (2, 4)]);

        let selection = allocate(
            &topics,
            &pool,
            6,
            OrderingMode::GroupedByTopicWeightDesc,
            &mut rng(),
        );

        assert_eq!(selection.len(), 6);
        // Topic 2 carries the larger weight, so its block comes first.
        let topic_2_count = count_for_topic(&selection, 2);
        assert!(
            selection[..topic_2_count]
                .iter()
                .all(|&id| id / 1000 == 2)
        );
        assert!(
            selection[topic_2_count..]
                .iter()
                .all(|&id| id / 1000 == 1)
        );
    }

    #[test]
    fn same_seed_reproduces_selection() {
        let topics = vec![topic(1, 2.0), topic(2, 1.0)];
        let pool = pool_of(&[(1, 8), (2, 8)]);

        let first = allocate(&topics, &pool, 6, OrderingMode::FullyShuffled, &mut rng());
        let second = allocate(&topics, &pool, 6, OrderingMode::FullyShuffled, &mut rng());

        assert_eq!(first, second);
    }
}
