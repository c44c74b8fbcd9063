use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use segmint_core::auth::PasswordRecord;
use segmint_core::domain::purchase::{PaymentStatus, Purchase};
use segmint_core::domain::segment::{ModelInfo, SegmentDefinition, SegmentId};
use segmint_core::domain::user::{User, UserId};
use segmint_core::segmentation::aggregate::{aggregate_completed, PurchaseAggregate};
use segmint_core::segmentation::engine::Assignments;
use segmint_core::segmentation::metrics::SegmentMetrics;

use super::{
    CategoryRevenue, MonthlyRevenue, PurchaseAnalytics, PurchaseRepository, RepositoryError,
    SegmentRepository, SegmentUpdate, StoredAssignment, UserProfileUpdate, UserRepository,
};

fn duplicate_key(what: &str) -> RepositoryError {
    // mirrors the driver-side unique violation so callers can branch the same way
    RepositoryError::Conflict(what.to_string())
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, (User, PasswordRecord)>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User, password: &PasswordRecord) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|(existing, _)| existing.email == user.email) {
            return Err(duplicate_key("users.email"));
        }
        users.insert(user.id.0.to_string(), (user.clone(), password.clone()));
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0.to_string()).map(|(user, _)| user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|(user, _)| user.email == email).map(|(user, _)| user.clone()))
    }

    async fn credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, PasswordRecord)>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|(user, _)| user.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut listed: Vec<User> = users.values().map(|(user, _)| user.clone()).collect();
        listed.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(listed)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.len() as u64)
    }

    async fn update_profile(
        &self,
        id: &UserId,
        update: UserProfileUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let mut users = self.users.write().await;
        let Some((user, _)) = users.get_mut(&id.0.to_string()) else {
            return Ok(None);
        };

        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn deactivate(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id.0.to_string()) {
            Some((user, _)) => {
                user.is_active = false;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPurchaseRepository {
    purchases: RwLock<Vec<Purchase>>,
}

impl InMemoryPurchaseRepository {
    pub async fn seed(&self, purchases: Vec<Purchase>) {
        let mut store = self.purchases.write().await;
        store.extend(purchases);
    }
}

#[async_trait::async_trait]
impl PurchaseRepository for InMemoryPurchaseRepository {
    async fn create(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let mut purchases = self.purchases.write().await;
        if purchases.iter().any(|existing| existing.order_number == purchase.order_number) {
            return Err(duplicate_key("purchases.order_number"));
        }
        purchases.push(purchase.clone());
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let purchases = self.purchases.read().await;
        Ok(purchases
            .iter()
            .find(|purchase| purchase.gateway_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn set_status_by_reference(
        &self,
        reference: &str,
        status: PaymentStatus,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let mut purchases = self.purchases.write().await;
        for purchase in purchases.iter_mut() {
            if purchase.gateway_reference.as_deref() == Some(reference) {
                purchase.payment_status = status;
                return Ok(Some(purchase.clone()));
            }
        }
        Ok(None)
    }

    async fn history_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let purchases = self.purchases.read().await;
        let mut history: Vec<Purchase> =
            purchases.iter().filter(|purchase| &purchase.user_id == user_id).cloned().collect();
        history.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        history.truncate(limit as usize);
        Ok(history)
    }

    async fn aggregate_completed_by_customer(
        &self,
    ) -> Result<Vec<PurchaseAggregate>, RepositoryError> {
        let purchases = self.purchases.read().await;
        let mut ordered: Vec<Purchase> = purchases.clone();
        ordered.sort_by(|left, right| left.transaction_date.cmp(&right.transaction_date));
        Ok(aggregate_completed(&ordered))
    }

    async fn analytics(&self, now: DateTime<Utc>) -> Result<PurchaseAnalytics, RepositoryError> {
        let purchases = self.purchases.read().await;
        let completed: Vec<&Purchase> =
            purchases.iter().filter(|purchase| purchase.is_completed()).collect();

        let completed_revenue: Decimal =
            completed.iter().map(|purchase| purchase.total_amount).sum();
        let average_order_value = if completed.is_empty() {
            Decimal::ZERO
        } else {
            completed_revenue / Decimal::from(completed.len() as u64)
        };

        let cutoff = now - Duration::days(30);
        let mut monthly: Vec<MonthlyRevenue> = Vec::new();
        for purchase in completed.iter().filter(|p| p.transaction_date >= cutoff) {
            let (year, month) =
                (purchase.transaction_date.year(), purchase.transaction_date.month());
            match monthly.iter_mut().find(|m| m.year == year && m.month == month) {
                Some(bucket) => {
                    bucket.revenue += purchase.total_amount;
                    bucket.count += 1;
                }
                None => monthly.push(MonthlyRevenue {
                    year,
                    month,
                    revenue: purchase.total_amount,
                    count: 1,
                }),
            }
        }

        let mut by_category: HashMap<String, CategoryRevenue> = HashMap::new();
        for item in completed.iter().flat_map(|purchase| purchase.items.iter()) {
            let entry =
                by_category.entry(item.category.clone()).or_insert_with(|| CategoryRevenue {
                    category: item.category.clone(),
                    revenue: Decimal::ZERO,
                    count: 0,
                });
            entry.revenue += item.total_price;
            entry.count += 1;
        }
        let mut top_categories: Vec<CategoryRevenue> = by_category.into_values().collect();
        top_categories.sort_by(|left, right| right.revenue.cmp(&left.revenue));
        top_categories.truncate(10);

        Ok(PurchaseAnalytics {
            total_purchases: purchases.len() as u64,
            completed_purchases: completed.len() as u64,
            completed_revenue,
            average_order_value,
            monthly_revenue: monthly,
            top_categories,
        })
    }
}

#[derive(Default)]
pub struct InMemorySegmentRepository {
    definitions: RwLock<HashMap<String, SegmentDefinition>>,
    assignments: RwLock<HashMap<String, Vec<StoredAssignment>>>,
}

#[async_trait::async_trait]
impl SegmentRepository for InMemorySegmentRepository {
    async fn create(&self, definition: &SegmentDefinition) -> Result<(), RepositoryError> {
        let mut definitions = self.definitions.write().await;
        if definitions.values().any(|existing| existing.name == definition.name) {
            return Err(duplicate_key("segments.name"));
        }
        definitions.insert(definition.id.0.to_string(), definition.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SegmentId,
    ) -> Result<Option<SegmentDefinition>, RepositoryError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(&id.0.to_string()).cloned())
    }

    async fn list_active(&self) -> Result<Vec<SegmentDefinition>, RepositoryError> {
        let definitions = self.definitions.read().await;
        let mut listed: Vec<SegmentDefinition> =
            definitions.values().filter(|definition| definition.is_active).cloned().collect();
        listed.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(listed)
    }

    async fn update(
        &self,
        id: &SegmentId,
        update: SegmentUpdate,
    ) -> Result<Option<SegmentDefinition>, RepositoryError> {
        let mut definitions = self.definitions.write().await;
        let Some(definition) = definitions.get_mut(&id.0.to_string()) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            definition.name = name;
        }
        if let Some(description) = update.description {
            definition.description = Some(description);
        }
        if let Some(criteria) = update.criteria {
            definition.criteria = criteria;
        }
        if let Some(is_active) = update.is_active {
            definition.is_active = is_active;
        }
        definition.updated_at = Utc::now();

        Ok(Some(definition.clone()))
    }

    async fn deactivate(&self, id: &SegmentId) -> Result<bool, RepositoryError> {
        let mut definitions = self.definitions.write().await;
        match definitions.get_mut(&id.0.to_string()) {
            Some(definition) => {
                definition.is_active = false;
                definition.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_assignments(
        &self,
        id: &SegmentId,
        model: &ModelInfo,
        metrics: &SegmentMetrics,
        assignments: &Assignments,
    ) -> Result<(), RepositoryError> {
        let mut definitions = self.definitions.write().await;
        let Some(definition) = definitions.get_mut(&id.0.to_string()) else {
            return Ok(());
        };
        definition.model = model.clone();
        definition.latest_metrics = Some(metrics.clone());
        definition.updated_at = Utc::now();

        let stored: Vec<StoredAssignment> = match assignments {
            Assignments::Rfm(list) => list
                .iter()
                .map(|assignment| StoredAssignment {
                    customer_id: assignment.customer_id.clone(),
                    score: assignment.score,
                    segment_name: Some(assignment.segment_name.clone()),
                    cluster_index: None,
                    rfm_scores: Some(assignment.rfm_scores),
                    assigned_at: assignment.assigned_at,
                })
                .collect(),
            Assignments::Clusters(list) => list
                .iter()
                .map(|assignment| StoredAssignment {
                    customer_id: assignment.customer_id.clone(),
                    score: assignment.score,
                    segment_name: None,
                    cluster_index: Some(assignment.cluster_index),
                    rfm_scores: None,
                    assigned_at: assignment.assigned_at,
                })
                .collect(),
        };

        let mut all = self.assignments.write().await;
        all.insert(id.0.to_string(), stored);
        Ok(())
    }

    async fn assignments(
        &self,
        id: &SegmentId,
    ) -> Result<Vec<StoredAssignment>, RepositoryError> {
        let all = self.assignments.read().await;
        Ok(all.get(&id.0.to_string()).cloned().unwrap_or_default())
    }
}
