use std::sync::Arc;

use axum::Router;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use segmint_core::config::{AppConfig, ConfigError, LoadOptions};
use segmint_core::segmentation::engine::SegmentationEngine;
use segmint_db::repositories::{
    SqlPurchaseRepository, SqlSegmentRepository, SqlUserRepository,
};
use segmint_db::{connect_with_settings, migrations, DbPool};

use crate::auth::AuthContext;
use crate::payments::GatewayClient;
use crate::{auth, health, payments, segmentation, users};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

/// Assembles the full API surface against SQL-backed repositories.
pub fn router(app: &Application) -> Router {
    let users_repo = Arc::new(SqlUserRepository::new(app.db_pool.clone()));
    let purchases_repo = Arc::new(SqlPurchaseRepository::new(app.db_pool.clone()));
    let segments_repo = Arc::new(SqlSegmentRepository::new(app.db_pool.clone()));

    let auth_context = AuthContext {
        token_secret: app.config.auth.token_secret.expose_secret().as_bytes().to_vec(),
        token_ttl_secs: app.config.auth.token_ttl_secs,
        bootstrap_admin: app.config.auth.bootstrap_admin,
        users: users_repo.clone(),
    };
    let gateway = Arc::new(GatewayClient::from_config(&app.config.gateway));

    Router::new()
        .merge(health::router(app.db_pool.clone()))
        .merge(auth::router(auth_context.clone()))
        .merge(users::router(auth_context.clone()))
        .merge(segmentation::router(segmentation::SegmentationState {
            auth: auth_context.clone(),
            purchases: purchases_repo.clone(),
            segments: segments_repo,
            engine: SegmentationEngine::new(),
        }))
        .merge(payments::router(payments::PaymentsState {
            auth: auth_context,
            purchases: purchases_repo,
            gateway,
        }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use segmint_core::config::{ConfigOverrides, LoadOptions};
    use segmint_core::domain::purchase::{
        CustomerId, PaymentMethod, PaymentStatus, Purchase, PurchaseId, PurchaseItem,
    };
    use segmint_core::domain::user::UserId;
    use segmint_db::repositories::{
        PurchaseRepository, SqlPurchaseRepository, SqlUserRepository, UserRepository,
    };

    use super::bootstrap;

    fn valid_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                token_secret: Some("bootstrap-test-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_token_secret() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing secret must fail").to_string();
        assert!(message.contains("auth.token_secret"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations() {
        let app = bootstrap(valid_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('users', 'purchases', 'purchase_items', 'segments', 'segment_assignments')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline tables");

        let router = super::router(&app);
        drop(router);

        app.db_pool.close().await;
    }

    async fn request(
        router: &axum::Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, payload)
    }

    fn completed_purchase(buyer: &UserId, customer: &str, amount: i64, days_ago: i64) -> Purchase {
        let transaction_date = Utc::now() - Duration::days(days_ago);
        let amount = Decimal::new(amount * 100, 2);
        Purchase {
            id: PurchaseId(Uuid::new_v4()),
            user_id: buyer.clone(),
            customer_id: CustomerId(customer.to_string()),
            order_number: format!("ORD-{}", Uuid::new_v4().simple()),
            items: vec![PurchaseItem {
                product_id: "prod-1".to_string(),
                product_name: "Widget".to_string(),
                category: "books".to_string(),
                sku: None,
                quantity: 1,
                unit_price: amount,
                total_price: amount,
            }],
            total_amount: amount,
            currency: "GHS".to_string(),
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Completed,
            gateway_reference: None,
            transaction_date,
            created_at: transaction_date,
        }
    }

    #[tokio::test]
    async fn full_api_round_trip_over_the_real_router() {
        let app = bootstrap(valid_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap");
        let router = super::router(&app);

        let (status, health) = request(&router, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "ready");

        // the first registered account bootstraps as admin
        let (status, session) = request(
            &router,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "ops@example.com",
                "password": "long-enough-password",
                "first_name": "Adjoa",
                "last_name": "Boateng"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["user"]["role"], "admin");
        let token = session["token"].as_str().expect("token").to_string();

        let users = SqlUserRepository::new(app.db_pool.clone());
        let now = Utc::now();
        let buyer = segmint_core::domain::user::User {
            id: UserId(Uuid::new_v4()),
            email: "buyer@example.com".to_string(),
            first_name: "Kofi".to_string(),
            last_name: "Asante".to_string(),
            role: segmint_core::domain::user::Role::Member,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users
            .create(&buyer, &segmint_core::auth::hash_password("buyer-password"))
            .await
            .expect("seed buyer");

        let purchases = SqlPurchaseRepository::new(app.db_pool.clone());
        for record in [
            completed_purchase(&buyer.id, "best@example.com", 1200, 1),
            completed_purchase(&buyer.id, "best@example.com", 800, 20),
            completed_purchase(&buyer.id, "mid@example.com", 250, 45),
            completed_purchase(&buyer.id, "cold@example.com", 40, 280),
        ] {
            purchases.create(&record).await.expect("seed purchase");
        }

        let (status, created) = request(
            &router,
            "POST",
            "/api/segmentation/segments",
            Some(&token),
            Some(json!({"name": "Whole Cohort"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let segment_id = created["id"].as_str().expect("segment id").to_string();

        let (status, run) = request(
            &router,
            "POST",
            "/api/segmentation/run",
            Some(&token),
            Some(json!({"segment_id": segment_id, "algorithm": "rfm"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["accuracy"], 0.85);
        assert_eq!(run["metrics"]["total_customers"], 3);
        assert_eq!(run["assignments"].as_array().expect("assignments").len(), 3);
        // summary metrics are written back with the assignment list
        assert_eq!(run["segment"]["latest_metrics"]["total_customers"], 3);

        let (status, detail) = request(
            &router,
            "GET",
            &format!("/api/segmentation/segments/{segment_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["assignments"].as_array().expect("stored").len(), 3);

        let (status, _) = request(
            &router,
            "POST",
            "/api/segmentation/run",
            Some(&token),
            Some(json!({"segment_id": segment_id, "algorithm": "dbscan"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, analytics) =
            request(&router, "GET", "/api/segmentation/analytics", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analytics["completed_purchases"], 4);
        assert_eq!(analytics["segments_run"], 1);

        let (status, _) = request(&router, "GET", "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        app.db_pool.close().await;
    }
}
