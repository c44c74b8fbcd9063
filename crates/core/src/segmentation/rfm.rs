use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::purchase::CustomerId;
use crate::segmentation::aggregate::PurchaseAggregate;

const MILLIS_PER_DAY: i64 = 1000 * 60 * 60 * 24;

/// Score triple, each dimension in [1,5]. Assigned by relative rank within
/// the current cohort, not by absolute thresholds, so the distribution shifts
/// whenever the customer population changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfmScores {
    pub recency: u8,
    pub frequency: u8,
    pub monetary: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredCustomer {
    pub aggregate: PurchaseAggregate,
    /// Whole days since the last purchase, floor of the millisecond delta.
    pub recency_days: i64,
    pub scores: RfmScores,
}

/// Ranks the cohort along recency, frequency and monetary value and converts
/// each 1-based rank to a score via `ceil(rank / n * 5)`. Recency is
/// inverted (6 - score) so that a more recent purchase yields a higher score.
///
/// Ties keep the input order (stable sort); which of two exactly equal
/// customers ranks first is therefore inherited from the upstream ordering
/// and is accepted nondeterminism, not a bug.
pub fn score_cohort(aggregates: &[PurchaseAggregate], now: DateTime<Utc>) -> Vec<ScoredCustomer> {
    let total = aggregates.len();
    if total == 0 {
        return Vec::new();
    }

    let recency_days: Vec<i64> = aggregates
        .iter()
        .map(|aggregate| {
            (now - aggregate.last_purchase_date).num_milliseconds().div_euclid(MILLIS_PER_DAY)
        })
        .collect();

    let recency_ranks = ranks_by(aggregates, |left, right| {
        recency_days[left].cmp(&recency_days[right])
    });
    let frequency_ranks = ranks_by(aggregates, |left, right| {
        aggregates[right].frequency.cmp(&aggregates[left].frequency)
    });
    let monetary_ranks = ranks_by(aggregates, |left, right| {
        aggregates[right].total_spent.cmp(&aggregates[left].total_spent)
    });

    aggregates
        .iter()
        .enumerate()
        .map(|(index, aggregate)| {
            let id = &aggregate.customer_id;
            let scores = RfmScores {
                recency: 6 - quantile_score(recency_ranks[id], total),
                frequency: quantile_score(frequency_ranks[id], total),
                monetary: quantile_score(monetary_ranks[id], total),
            };
            ScoredCustomer { aggregate: aggregate.clone(), recency_days: recency_days[index], scores }
        })
        .collect()
}

/// 1-based rank of each customer under the given order. A single stable sort
/// over stored indices; positions match a linear first-occurrence search over
/// a sorted copy, as ranks are defined by sort order alone.
fn ranks_by<F>(aggregates: &[PurchaseAggregate], compare: F) -> HashMap<&CustomerId, usize>
where
    F: Fn(usize, usize) -> std::cmp::Ordering,
{
    let mut order: Vec<usize> = (0..aggregates.len()).collect();
    order.sort_by(|&left, &right| compare(left, right));

    let mut ranks = HashMap::with_capacity(aggregates.len());
    for (position, index) in order.iter().enumerate() {
        ranks.entry(&aggregates[*index].customer_id).or_insert(position + 1);
    }
    ranks
}

/// `ceil(rank / total * 5)` in integer arithmetic; rank in [1,total] maps
/// into [1,5], the ceiling bounding the top end.
fn quantile_score(rank: usize, total: usize) -> u8 {
    ((rank * 5).div_ceil(total)) as u8
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::purchase::CustomerId;
    use crate::segmentation::aggregate::PurchaseAggregate;

    use super::{quantile_score, score_cohort};

    fn aggregate_at(
        now: DateTime<Utc>,
        customer: &str,
        days_ago: i64,
        spent: i64,
        frequency: u64,
    ) -> PurchaseAggregate {
        let total_spent = Decimal::new(spent * 100, 2);
        PurchaseAggregate {
            customer_id: CustomerId(customer.to_string()),
            last_purchase_date: now - Duration::days(days_ago),
            total_spent,
            frequency,
            avg_order_value: total_spent / Decimal::from(frequency.max(1)),
            categories: Vec::new(),
        }
    }

    #[test]
    fn cohort_of_one_scores_five_on_every_dimension() {
        let now = Utc::now();
        let scored = score_cohort(&[aggregate_at(now, "solo@example.com", 200, 10, 1)], now);

        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].scores.recency, 5);
        assert_eq!(scored[0].scores.frequency, 5);
        assert_eq!(scored[0].scores.monetary, 5);
    }

    #[test]
    fn scores_stay_within_bounds_for_larger_cohorts() {
        let now = Utc::now();
        let aggregates: Vec<_> = (0..23)
            .map(|i| aggregate_at(now, &format!("c{i}@example.com"), i * 7, (i + 1) * 10, i as u64 + 1))
            .collect();

        for scored in score_cohort(&aggregates, now) {
            for score in [scored.scores.recency, scored.scores.frequency, scored.scores.monetary] {
                assert!((1..=5).contains(&score), "score {score} out of bounds");
            }
        }
    }

    #[test]
    fn best_customer_outranks_worst_on_every_dimension() {
        let now = Utc::now();
        let aggregates = vec![
            aggregate_at(now, "best@example.com", 1, 1000, 50),
            aggregate_at(now, "mid@example.com", 30, 200, 10),
            aggregate_at(now, "worst@example.com", 300, 10, 1),
        ];

        let scored = score_cohort(&aggregates, now);

        let best = &scored[0].scores;
        let worst = &scored[2].scores;
        assert!(best.recency > worst.recency, "recent purchase must score higher");
        assert!(best.frequency > worst.frequency);
        assert!(best.monetary > worst.monetary);
    }

    #[test]
    fn recency_days_uses_floor_of_millisecond_delta() {
        let now = Utc::now();
        let mut aggregate = aggregate_at(now, "a@example.com", 0, 10, 1);
        // 47.9 hours ago is still 1 whole day
        aggregate.last_purchase_date = now - Duration::minutes(47 * 60 + 54);

        let scored = score_cohort(&[aggregate], now);

        assert_eq!(scored[0].recency_days, 1);
    }

    #[test]
    fn rescoring_an_unchanged_cohort_is_idempotent() {
        let now = Utc::now();
        let aggregates = vec![
            aggregate_at(now, "a@example.com", 2, 900, 12),
            aggregate_at(now, "b@example.com", 45, 300, 4),
            aggregate_at(now, "c@example.com", 120, 50, 1),
        ];

        let first = score_cohort(&aggregates, now);
        let second = score_cohort(&aggregates, now);

        assert_eq!(first, second);
    }

    #[test]
    fn quantile_score_matches_ceiling_definition() {
        assert_eq!(quantile_score(1, 1), 5);
        assert_eq!(quantile_score(1, 5), 1);
        assert_eq!(quantile_score(5, 5), 5);
        assert_eq!(quantile_score(1, 10), 1);
        assert_eq!(quantile_score(2, 10), 1);
        assert_eq!(quantile_score(3, 10), 2);
        assert_eq!(quantile_score(10, 10), 5);
        assert_eq!(quantile_score(1, 3), 2);
    }

    #[test]
    fn empty_cohort_produces_no_scores() {
        assert!(score_cohort(&[], Utc::now()).is_empty());
    }
}
