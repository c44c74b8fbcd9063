use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use segmint_core::auth::PasswordRecord;
use segmint_core::domain::purchase::{PaymentStatus, Purchase};
use segmint_core::domain::segment::{
    ModelInfo, SegmentCriteria, SegmentDefinition, SegmentId,
};
use segmint_core::domain::user::{Role, User, UserId};
use segmint_core::segmentation::aggregate::PurchaseAggregate;
use segmint_core::segmentation::engine::Assignments;
use segmint_core::segmentation::metrics::SegmentMetrics;

pub mod memory;
pub mod purchase;
pub mod segment;
pub mod user;

pub use memory::{InMemoryPurchaseRepository, InMemorySegmentRepository, InMemoryUserRepository};
pub use purchase::{
    CategoryRevenue, MonthlyRevenue, PurchaseAnalytics, SqlPurchaseRepository,
};
pub use segment::{SqlSegmentRepository, StoredAssignment};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => error.is_unique_violation(),
            Self::Conflict(_) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct UserProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct SegmentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub criteria: Option<SegmentCriteria>,
    pub is_active: Option<bool>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User, password: &PasswordRecord) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    /// User plus stored password record, for login verification.
    async fn credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, PasswordRecord)>, RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
    async fn update_profile(
        &self,
        id: &UserId,
        update: UserProfileUpdate,
    ) -> Result<Option<User>, RepositoryError>;
    async fn deactivate(&self, id: &UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn create(&self, purchase: &Purchase) -> Result<(), RepositoryError>;
    async fn find_by_reference(&self, reference: &str)
        -> Result<Option<Purchase>, RepositoryError>;
    /// Transition the purchase matching a gateway reference, returning the
    /// updated record when one exists.
    async fn set_status_by_reference(
        &self,
        reference: &str,
        status: PaymentStatus,
    ) -> Result<Option<Purchase>, RepositoryError>;
    async fn history_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Purchase>, RepositoryError>;
    /// The grouping primitive the segmentation pipeline consumes: one
    /// aggregate per customer with at least one completed purchase.
    async fn aggregate_completed_by_customer(
        &self,
    ) -> Result<Vec<PurchaseAggregate>, RepositoryError>;
    async fn analytics(&self, now: DateTime<Utc>) -> Result<PurchaseAnalytics, RepositoryError>;
}

#[async_trait]
pub trait SegmentRepository: Send + Sync {
    async fn create(&self, definition: &SegmentDefinition) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        id: &SegmentId,
    ) -> Result<Option<SegmentDefinition>, RepositoryError>;
    async fn list_active(&self) -> Result<Vec<SegmentDefinition>, RepositoryError>;
    async fn update(
        &self,
        id: &SegmentId,
        update: SegmentUpdate,
    ) -> Result<Option<SegmentDefinition>, RepositoryError>;
    async fn deactivate(&self, id: &SegmentId) -> Result<bool, RepositoryError>;
    /// Replaces the definition's assignment list, model info and summary
    /// metrics in one transaction; the last writer wins for concurrent runs
    /// on the same definition.
    async fn replace_assignments(
        &self,
        id: &SegmentId,
        model: &ModelInfo,
        metrics: &SegmentMetrics,
        assignments: &Assignments,
    ) -> Result<(), RepositoryError>;
    async fn assignments(&self, id: &SegmentId)
        -> Result<Vec<StoredAssignment>, RepositoryError>;
}
