pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod segmentation;

pub use chrono;

pub use domain::purchase::{
    CustomerId, PaymentMethod, PaymentStatus, Purchase, PurchaseId, PurchaseItem,
};
pub use domain::segment::{
    Algorithm, ModelInfo, SegmentCriteria, SegmentDefinition, SegmentId,
};
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError, SegmentationError};
pub use segmentation::aggregate::{aggregate_completed, PurchaseAggregate};
pub use segmentation::classify::{assign_segments, classify, Segment, SegmentAssignment};
pub use segmentation::cluster::{assign_clusters, ClusterAssignment, DEFAULT_CLUSTER_COUNT};
pub use segmentation::engine::{
    Assignments, RunParameters, SegmentationEngine, SegmentationOutcome, KMEANS_ACCURACY,
    RFM_ACCURACY,
};
pub use segmentation::metrics::{report_clusters, report_segments, SegmentMetrics};
pub use segmentation::rfm::{score_cohort, RfmScores, ScoredCustomer};
