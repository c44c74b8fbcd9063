use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::segment::Algorithm;
use crate::errors::SegmentationError;
use crate::segmentation::aggregate::PurchaseAggregate;
use crate::segmentation::classify::{assign_segments, SegmentAssignment};
use crate::segmentation::cluster::{assign_clusters, ClusterAssignment, DEFAULT_CLUSTER_COUNT};
use crate::segmentation::metrics::{report_clusters, report_segments, SegmentMetrics};
use crate::segmentation::rfm::score_cohort;

/// Placeholder accuracy constants recorded on run output. These are not
/// measured statistics; callers must not treat them as a quality signal.
pub const RFM_ACCURACY: f64 = 0.85;
pub const KMEANS_ACCURACY: f64 = 0.78;

/// One run produces either a full RFM assignment list or a full cluster
/// assignment list, never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignments {
    Rfm(Vec<SegmentAssignment>),
    Clusters(Vec<ClusterAssignment>),
}

impl Assignments {
    pub fn len(&self) -> usize {
        match self {
            Self::Rfm(list) => list.len(),
            Self::Clusters(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub algorithm: Algorithm,
    pub total_customers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentationOutcome {
    pub assignments: Assignments,
    pub accuracy: f64,
    pub parameters: RunParameters,
    pub metrics: SegmentMetrics,
}

/// Stateless pipeline runner, instantiated once at process start and shared
/// by reference; no behavior depends on instance identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SegmentationEngine;

impl SegmentationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs the named algorithm over the aggregated cohort. Unknown algorithm
    /// names fail fast before any computation.
    pub fn run(
        &self,
        algorithm: &str,
        k: Option<usize>,
        aggregates: &[PurchaseAggregate],
        now: DateTime<Utc>,
    ) -> Result<SegmentationOutcome, SegmentationError> {
        match Algorithm::parse(algorithm) {
            Some(Algorithm::Rfm) => self.run_rfm(aggregates, now),
            Some(Algorithm::Kmeans) => {
                self.run_kmeans(aggregates, k.unwrap_or(DEFAULT_CLUSTER_COUNT), now)
            }
            None => Err(SegmentationError::UnsupportedAlgorithm(algorithm.to_string())),
        }
    }

    pub fn run_rfm(
        &self,
        aggregates: &[PurchaseAggregate],
        now: DateTime<Utc>,
    ) -> Result<SegmentationOutcome, SegmentationError> {
        let scored = score_cohort(aggregates, now);
        let assignments = assign_segments(&scored, now);
        let metrics = report_segments(&assignments)?;

        Ok(SegmentationOutcome {
            parameters: RunParameters {
                algorithm: Algorithm::Rfm,
                total_customers: aggregates.len(),
                segments: Some(metrics.distribution.len()),
                k: None,
            },
            assignments: Assignments::Rfm(assignments),
            accuracy: RFM_ACCURACY,
            metrics,
        })
    }

    pub fn run_kmeans(
        &self,
        aggregates: &[PurchaseAggregate],
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<SegmentationOutcome, SegmentationError> {
        let assignments = assign_clusters(aggregates, k, now)?;
        let metrics = report_clusters(&assignments)?;

        Ok(SegmentationOutcome {
            parameters: RunParameters {
                algorithm: Algorithm::Kmeans,
                total_customers: aggregates.len(),
                segments: None,
                k: Some(k),
            },
            assignments: Assignments::Clusters(assignments),
            accuracy: KMEANS_ACCURACY,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::purchase::CustomerId;
    use crate::errors::SegmentationError;
    use crate::segmentation::aggregate::PurchaseAggregate;
    use crate::segmentation::engine::{Assignments, SegmentationEngine};

    fn aggregate(customer: &str, days_ago: i64, spent: i64, frequency: u64) -> PurchaseAggregate {
        let total_spent = Decimal::new(spent * 100, 2);
        PurchaseAggregate {
            customer_id: CustomerId(customer.to_string()),
            last_purchase_date: Utc::now() - Duration::days(days_ago),
            total_spent,
            frequency,
            avg_order_value: total_spent / Decimal::from(frequency.max(1)),
            categories: Vec::new(),
        }
    }

    fn cohort() -> Vec<PurchaseAggregate> {
        vec![
            aggregate("best@example.com", 1, 1200, 24),
            aggregate("mid@example.com", 40, 300, 6),
            aggregate("cold@example.com", 250, 40, 1),
        ]
    }

    #[test]
    fn unsupported_algorithm_fails_fast() {
        let engine = SegmentationEngine::new();
        let error = engine
            .run("dbscan", None, &cohort(), Utc::now())
            .expect_err("unknown algorithm must fail");
        assert_eq!(error, SegmentationError::UnsupportedAlgorithm("dbscan".to_string()));
    }

    #[test]
    fn rfm_run_reports_placeholder_accuracy_and_full_cohort() {
        let engine = SegmentationEngine::new();
        let outcome = engine.run("rfm", None, &cohort(), Utc::now()).expect("rfm run");

        assert_eq!(outcome.accuracy, super::RFM_ACCURACY);
        assert_eq!(outcome.parameters.total_customers, 3);
        assert_eq!(outcome.assignments.len(), 3);
        assert_eq!(outcome.metrics.total_customers, 3);

        let Assignments::Rfm(assignments) = outcome.assignments else {
            panic!("rfm run must produce segment assignments");
        };
        assert!(assignments
            .iter()
            .all(|a| [20, 45, 60, 70, 85, 100].contains(&a.score)));
    }

    #[test]
    fn kmeans_run_defaults_k_and_reports_placeholder_accuracy() {
        let engine = SegmentationEngine::new();
        let outcome = engine.run("kmeans", None, &cohort(), Utc::now()).expect("kmeans run");

        assert_eq!(outcome.accuracy, super::KMEANS_ACCURACY);
        assert_eq!(outcome.parameters.k, Some(super::DEFAULT_CLUSTER_COUNT));

        let Assignments::Clusters(clusters) = outcome.assignments else {
            panic!("kmeans run must produce cluster assignments");
        };
        assert!(clusters.iter().all(|c| c.cluster_index < super::DEFAULT_CLUSTER_COUNT));
    }

    #[test]
    fn empty_cohort_surfaces_an_explicit_error_on_both_paths() {
        let engine = SegmentationEngine::new();
        let now = Utc::now();

        assert_eq!(
            engine.run("rfm", None, &[], now),
            Err(SegmentationError::EmptyAssignments)
        );
        assert_eq!(engine.run("kmeans", None, &[], now), Err(SegmentationError::EmptyCohort));
    }

    #[test]
    fn rerunning_an_unchanged_snapshot_yields_identical_assignments() {
        let engine = SegmentationEngine::new();
        let aggregates = cohort();
        let now = Utc::now();

        let first = engine.run("rfm", None, &aggregates, now).expect("first run");
        let second = engine.run("rfm", None, &aggregates, now).expect("second run");

        assert_eq!(first, second);
    }
}
