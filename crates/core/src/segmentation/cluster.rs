use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::purchase::CustomerId;
use crate::errors::SegmentationError;
use crate::segmentation::aggregate::PurchaseAggregate;

pub const DEFAULT_CLUSTER_COUNT: usize = 4;

/// Run-local grouping. Cluster indices are not labeled and carry no meaning
/// across runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub customer_id: CustomerId,
    /// 0-100, rounded; reaches 100 only when both normalized metrics are 1.
    pub score: u32,
    pub cluster_index: usize,
    pub assigned_at: DateTime<Utc>,
}

/// Buckets customers into `k` clusters from spend and frequency normalized by
/// the cohort maxima. This is a heuristic linear combination, not iterative
/// k-means. A cohort whose maximum spend or frequency is zero cannot be
/// normalized and is rejected outright rather than letting NaN reach the
/// indices.
pub fn assign_clusters(
    aggregates: &[PurchaseAggregate],
    k: usize,
    assigned_at: DateTime<Utc>,
) -> Result<Vec<ClusterAssignment>, SegmentationError> {
    if k == 0 {
        return Err(SegmentationError::InvalidClusterCount(k));
    }
    if aggregates.is_empty() {
        return Err(SegmentationError::EmptyCohort);
    }

    let max_spent = aggregates
        .iter()
        .map(|aggregate| aggregate.total_spent.to_f64().unwrap_or(0.0))
        .fold(0.0_f64, f64::max);
    let max_frequency =
        aggregates.iter().map(|aggregate| aggregate.frequency).max().unwrap_or(0) as f64;

    if max_spent <= 0.0 {
        return Err(SegmentationError::DegenerateCohort { metric: "total_spent" });
    }
    if max_frequency <= 0.0 {
        return Err(SegmentationError::DegenerateCohort { metric: "frequency" });
    }

    Ok(aggregates
        .iter()
        .map(|aggregate| {
            let normalized_spent = aggregate.total_spent.to_f64().unwrap_or(0.0) / max_spent;
            let normalized_frequency = aggregate.frequency as f64 / max_frequency;
            let combined = normalized_spent + normalized_frequency;

            let mut cluster_index = (combined / 2.0 * k as f64).floor() as usize;
            if cluster_index >= k {
                cluster_index = k - 1;
            }

            ClusterAssignment {
                customer_id: aggregate.customer_id.clone(),
                score: (combined * 50.0).round() as u32,
                cluster_index,
                assigned_at,
            }
        })
        .collect())
}
