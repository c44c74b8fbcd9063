use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;
use crate::segmentation::metrics::SegmentMetrics;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Rfm,
    Kmeans,
}

impl Algorithm {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rfm" => Some(Self::Rfm),
            "kmeans" => Some(Self::Kmeans),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfm => "rfm",
            Self::Kmeans => "kmeans",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountBounds {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBounds {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

/// Selection criteria stored on a definition. Carried through create/update
/// and returned to callers; the current algorithms score the whole cohort and
/// do not filter by these bounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentCriteria {
    #[serde(default)]
    pub total_spent: AmountBounds,
    #[serde(default)]
    pub frequency: CountBounds,
    #[serde(default)]
    pub recency_days: Option<i64>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub algorithm: Algorithm,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub last_trained: Option<DateTime<Utc>>,
    /// Placeholder constant recorded by the engine, not a measured statistic.
    pub accuracy: Option<f64>,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Rfm,
            parameters: serde_json::Value::Null,
            last_trained: None,
            accuracy: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentDefinition {
    pub id: SegmentId,
    pub name: String,
    pub description: Option<String>,
    pub criteria: SegmentCriteria,
    pub model: ModelInfo,
    /// Summary of the most recent run, replaced together with the assignment
    /// list; None until the definition has been run once.
    pub latest_metrics: Option<SegmentMetrics>,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
