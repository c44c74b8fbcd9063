use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::SegmentationError;
use crate::segmentation::classify::SegmentAssignment;
use crate::segmentation::cluster::ClusterAssignment;

/// Population summary over one run's assignment list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub total_customers: usize,
    /// Member count per segment name (RFM) or cluster index (k-means).
    pub distribution: BTreeMap<String, usize>,
    pub average_score: f64,
}

pub fn report_segments(
    assignments: &[SegmentAssignment],
) -> Result<SegmentMetrics, SegmentationError> {
    report(assignments.iter().map(|a| (a.segment_name.clone(), a.score)))
}

pub fn report_clusters(
    assignments: &[ClusterAssignment],
) -> Result<SegmentMetrics, SegmentationError> {
    report(assignments.iter().map(|a| (a.cluster_index.to_string(), a.score)))
}

/// An empty assignment list is rejected outright: the mean of zero scores is
/// an error here, never NaN.
fn report(
    buckets: impl Iterator<Item = (String, u32)>,
) -> Result<SegmentMetrics, SegmentationError> {
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_customers = 0usize;
    let mut score_sum = 0u64;

    for (bucket, score) in buckets {
        *distribution.entry(bucket).or_insert(0) += 1;
        total_customers += 1;
        score_sum += u64::from(score);
    }

    if total_customers == 0 {
        return Err(SegmentationError::EmptyAssignments);
    }

    Ok(SegmentMetrics {
        total_customers,
        distribution,
        average_score: score_sum as f64 / total_customers as f64,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::purchase::CustomerId;
    use crate::errors::SegmentationError;
    use crate::segmentation::classify::SegmentAssignment;
    use crate::segmentation::cluster::ClusterAssignment;
    use crate::segmentation::rfm::RfmScores;

    use super::{report_clusters, report_segments};

    fn assignment(customer: &str, segment_name: &str, score: u32) -> SegmentAssignment {
        SegmentAssignment {
            customer_id: CustomerId(customer.to_string()),
            score,
            segment_name: segment_name.to_string(),
            rfm_scores: RfmScores { recency: 3, frequency: 3, monetary: 3 },
            assigned_at: Utc::now(),
        }
    }

    #[test]
    fn averages_scores_and_counts_segment_members() {
        let assignments = vec![
            assignment("a@example.com", "Champions", 100),
            assignment("b@example.com", "Potential Loyalists", 60),
            assignment("c@example.com", "Lost Customers", 20),
        ];

        let metrics = report_segments(&assignments).expect("non-empty assignments");

        assert_eq!(metrics.total_customers, 3);
        assert_eq!(metrics.average_score, 60.0);
        assert_eq!(metrics.distribution.get("Champions"), Some(&1));
        assert_eq!(metrics.distribution.get("Potential Loyalists"), Some(&1));
        assert_eq!(metrics.distribution.get("Lost Customers"), Some(&1));
    }

    #[test]
    fn counts_repeat_members_in_one_bucket() {
        let assignments = vec![
            assignment("a@example.com", "Loyal Customers", 85),
            assignment("b@example.com", "Loyal Customers", 85),
        ];

        let metrics = report_segments(&assignments).expect("non-empty assignments");

        assert_eq!(metrics.distribution.len(), 1);
        assert_eq!(metrics.distribution.get("Loyal Customers"), Some(&2));
        assert_eq!(metrics.average_score, 85.0);
    }

    #[test]
    fn cluster_report_keys_by_index() {
        let assignments = vec![
            ClusterAssignment {
                customer_id: CustomerId("a@example.com".to_string()),
                score: 80,
                cluster_index: 3,
                assigned_at: Utc::now(),
            },
            ClusterAssignment {
                customer_id: CustomerId("b@example.com".to_string()),
                score: 20,
                cluster_index: 0,
                assigned_at: Utc::now(),
            },
        ];

        let metrics = report_clusters(&assignments).expect("non-empty assignments");

        assert_eq!(metrics.distribution.get("3"), Some(&1));
        assert_eq!(metrics.distribution.get("0"), Some(&1));
        assert_eq!(metrics.average_score, 50.0);
    }

    #[test]
    fn empty_assignment_list_is_an_explicit_error() {
        assert_eq!(report_segments(&[]), Err(SegmentationError::EmptyAssignments));
        assert_eq!(report_clusters(&[]), Err(SegmentationError::EmptyAssignments));
    }
}
