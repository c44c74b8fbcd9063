//! Customer segmentation pipeline: aggregate completed purchases, score the
//! cohort, then either classify score triples into named segments or bucket
//! customers into index-based clusters, and summarize the result.
//!
//! Every stage is a pure, synchronous function over fully materialized
//! inputs; a run computes or fails atomically with no partial output.

pub mod aggregate;
pub mod classify;
pub mod cluster;
pub mod engine;
pub mod metrics;
pub mod rfm;

pub use aggregate::{aggregate_completed, PurchaseAggregate};
pub use classify::{assign_segments, classify, Segment, SegmentAssignment};
pub use cluster::{assign_clusters, ClusterAssignment, DEFAULT_CLUSTER_COUNT};
pub use engine::{
    Assignments, RunParameters, SegmentationEngine, SegmentationOutcome, KMEANS_ACCURACY,
    RFM_ACCURACY,
};
pub use metrics::{report_clusters, report_segments, SegmentMetrics};
pub use rfm::{score_cohort, RfmScores, ScoredCustomer};
