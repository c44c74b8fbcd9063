use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::purchase::CustomerId;
use crate::segmentation::rfm::{RfmScores, ScoredCustomer};

/// Named value buckets a score triple can classify into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Champions,
    LoyalCustomers,
    NewCustomers,
    AtRisk,
    LostCustomers,
    PotentialLoyalists,
}

impl Segment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Champions => "Champions",
            Self::LoyalCustomers => "Loyal Customers",
            Self::NewCustomers => "New Customers",
            Self::AtRisk => "At Risk",
            Self::LostCustomers => "Lost Customers",
            Self::PotentialLoyalists => "Potential Loyalists",
        }
    }

    pub fn score(&self) -> u32 {
        match self {
            Self::Champions => 100,
            Self::LoyalCustomers => 85,
            Self::NewCustomers => 70,
            Self::AtRisk => 45,
            Self::LostCustomers => 20,
            Self::PotentialLoyalists => 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentAssignment {
    pub customer_id: CustomerId,
    pub score: u32,
    pub segment_name: String,
    pub rfm_scores: RfmScores,
    pub assigned_at: DateTime<Utc>,
}

type Predicate = fn(&RfmScores) -> bool;

fn is_champion(s: &RfmScores) -> bool {
    s.recency >= 4 && s.frequency >= 4 && s.monetary >= 4
}

fn is_loyal(s: &RfmScores) -> bool {
    s.recency >= 3 && s.frequency >= 3 && s.monetary >= 3
}

fn is_new(s: &RfmScores) -> bool {
    s.recency >= 4 && s.frequency <= 2
}

fn is_at_risk(s: &RfmScores) -> bool {
    s.recency <= 2 && s.frequency >= 3 && s.monetary >= 3
}

fn is_lost(s: &RfmScores) -> bool {
    s.recency <= 2 && s.frequency <= 2
}

/// Ordered decision list, first match wins. The rules are not mutually
/// exclusive, so this order is load-bearing: (4,4,2) must fall through the
/// first two rules and land on New Customers.
const RULES: [(Predicate, Segment); 5] = [
    (is_champion, Segment::Champions),
    (is_loyal, Segment::LoyalCustomers),
    (is_new, Segment::NewCustomers),
    (is_at_risk, Segment::AtRisk),
    (is_lost, Segment::LostCustomers),
];

/// Pure function of a score triple to a named segment.
pub fn classify(scores: &RfmScores) -> Segment {
    RULES
        .iter()
        .find(|(matches, _)| matches(scores))
        .map(|(_, segment)| *segment)
        .unwrap_or(Segment::PotentialLoyalists)
}

/// One assignment per scored customer; re-running a definition replaces its
/// assignment list wholesale.
pub fn assign_segments(
    scored: &[ScoredCustomer],
    assigned_at: DateTime<Utc>,
) -> Vec<SegmentAssignment> {
    scored
        .iter()
        .map(|customer| {
            let segment = classify(&customer.scores);
            SegmentAssignment {
                customer_id: customer.aggregate.customer_id.clone(),
                score: segment.score(),
                segment_name: segment.label().to_string(),
                rfm_scores: customer.scores,
                assigned_at,
            }
        })
        .collect()
}
