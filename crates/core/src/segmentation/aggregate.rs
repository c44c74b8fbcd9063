use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::purchase::{CustomerId, Purchase};

/// Per-customer rollup of completed purchases. Built fresh on every
/// segmentation run and never persisted on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseAggregate {
    pub customer_id: CustomerId,
    pub last_purchase_date: DateTime<Utc>,
    pub total_spent: Decimal,
    /// Completed-purchase count; at least 1 for any aggregate present.
    pub frequency: u64,
    pub avg_order_value: Decimal,
    /// Distinct item categories seen across the customer's purchases.
    /// Collected for the clustering path but unused downstream.
    pub categories: Vec<String>,
}

/// Groups completed purchases by customer. Customers with no completed
/// purchase are absent from the output entirely — the cohort is "customers
/// who have purchased", not "all registered users". Output preserves the
/// order in which customers first appear in the input.
pub fn aggregate_completed(purchases: &[Purchase]) -> Vec<PurchaseAggregate> {
    let mut by_customer: HashMap<&CustomerId, usize> = HashMap::new();
    let mut aggregates: Vec<PurchaseAggregate> = Vec::new();

    for purchase in purchases.iter().filter(|purchase| purchase.is_completed()) {
        let slot = match by_customer.get(&purchase.customer_id) {
            Some(&index) => index,
            None => {
                by_customer.insert(&purchase.customer_id, aggregates.len());
                aggregates.push(PurchaseAggregate {
                    customer_id: purchase.customer_id.clone(),
                    last_purchase_date: purchase.transaction_date,
                    total_spent: Decimal::ZERO,
                    frequency: 0,
                    avg_order_value: Decimal::ZERO,
                    categories: Vec::new(),
                });
                aggregates.len() - 1
            }
        };

        let aggregate = &mut aggregates[slot];
        aggregate.total_spent += purchase.total_amount;
        aggregate.frequency += 1;
        if purchase.transaction_date > aggregate.last_purchase_date {
            aggregate.last_purchase_date = purchase.transaction_date;
        }
        for item in &purchase.items {
            if !aggregate.categories.contains(&item.category) {
                aggregate.categories.push(item.category.clone());
            }
        }
    }

    for aggregate in &mut aggregates {
        // frequency >= 1 holds for every aggregate created above
        aggregate.avg_order_value = aggregate.total_spent / Decimal::from(aggregate.frequency);
    }

    aggregates
}
