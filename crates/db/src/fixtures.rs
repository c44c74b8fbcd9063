use serde::Serialize;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo seeds and their verification contract.
const SEED_USER_COUNT: i64 = 7;
const SEED_PURCHASE_COUNT: i64 = 15;
const SEED_COMPLETED_PURCHASE_COUNT: i64 = 14;
const SEED_SEGMENT_COUNT: i64 = 1;
/// Customers with at least one completed purchase; the pending-only tail of
/// kwame's history must not add a seventh cohort member.
const SEED_COHORT_SIZE: i64 = 6;

const SEED_CUSTOMER_IDS: &[&str] = &[
    "kofi@example.com",
    "ama@example.com",
    "esi@example.com",
    "yaw@example.com",
    "abena@example.com",
    "kwame@example.com",
];

pub const SEED_ADMIN_EMAIL: &str = "admin@segmint.dev";
pub const SEED_SEGMENT_NAME: &str = "High Value Customers";

/// Deterministic demo dataset: an admin operator plus six customers whose
/// purchase shapes land in distinct value segments.
pub struct DemoSeedDataset;

#[derive(Clone, Debug, Serialize)]
pub struct SeedResult {
    pub users_seeded: i64,
    pub purchases_seeded: i64,
    pub segments_seeded: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub checks: Vec<SeedCheck>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeedCheck {
    pub name: String,
    pub expected: i64,
    pub actual: i64,
}

impl DemoSeedDataset {
    /// SQL fixture content for the demo seed data.
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    /// Load the demo dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users_seeded: SEED_USER_COUNT,
            purchases_seeded: SEED_PURCHASE_COUNT,
            segments_seeded: SEED_SEGMENT_COUNT,
        })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pool).await?;
        checks.push(SeedCheck {
            name: "users".to_string(),
            expected: SEED_USER_COUNT,
            actual: users,
        });

        let purchases: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM purchases").fetch_one(pool).await?;
        checks.push(SeedCheck {
            name: "purchases".to_string(),
            expected: SEED_PURCHASE_COUNT,
            actual: purchases,
        });

        let completed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM purchases WHERE payment_status = 'completed'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(SeedCheck {
            name: "completed_purchases".to_string(),
            expected: SEED_COMPLETED_PURCHASE_COUNT,
            actual: completed,
        });

        let cohort: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT customer_id) FROM purchases WHERE payment_status = 'completed'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(SeedCheck {
            name: "cohort_size".to_string(),
            expected: SEED_COHORT_SIZE,
            actual: cohort,
        });

        let segments: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM segments").fetch_one(pool).await?;
        checks.push(SeedCheck {
            name: "segments".to_string(),
            expected: SEED_SEGMENT_COUNT,
            actual: segments,
        });

        let passed = checks.iter().all(|check| check.expected == check.actual);
        Ok(VerificationResult { passed, checks })
    }

    pub fn customer_ids() -> &'static [&'static str] {
        SEED_CUSTOMER_IDS
    }
}
