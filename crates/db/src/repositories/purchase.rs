use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use segmint_core::domain::purchase::{
    CustomerId, PaymentMethod, PaymentStatus, Purchase, PurchaseId, PurchaseItem,
};
use segmint_core::domain::user::UserId;
use segmint_core::segmentation::aggregate::{aggregate_completed, PurchaseAggregate};

use super::{PurchaseRepository, RepositoryError};
use crate::repositories::user::{parse_datetime, parse_uuid};
use crate::DbPool;

/// Store-wide purchase analytics for the admin dashboard.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PurchaseAnalytics {
    pub total_purchases: u64,
    pub completed_purchases: u64,
    pub completed_revenue: Decimal,
    pub average_order_value: Decimal,
    /// Completed revenue in the trailing 30 days, bucketed by calendar month.
    pub monthly_revenue: Vec<MonthlyRevenue>,
    /// Top categories by completed revenue, capped at ten.
    pub top_categories: Vec<CategoryRevenue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub revenue: Decimal,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: Decimal,
    pub count: u64,
}

pub struct SqlPurchaseRepository {
    pool: DbPool,
}

impl SqlPurchaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_with_items(
        &self,
        where_clause: &str,
        binds: &[String],
        order_clause: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let mut sql = format!(
            "SELECT id, user_id, customer_id, order_number, total_amount, currency, \
             payment_method, payment_status, gateway_reference, transaction_date, created_at \
             FROM purchases WHERE {where_clause} {order_clause}"
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut purchases: Vec<Purchase> =
            rows.iter().map(purchase_from_row).collect::<Result<_, _>>()?;

        if purchases.is_empty() {
            return Ok(purchases);
        }

        let mut items_by_purchase = self.fetch_items(&purchases).await?;
        for purchase in &mut purchases {
            purchase.items =
                items_by_purchase.remove(&purchase.id.0.to_string()).unwrap_or_default();
        }

        Ok(purchases)
    }

    async fn fetch_items(
        &self,
        purchases: &[Purchase],
    ) -> Result<HashMap<String, Vec<PurchaseItem>>, RepositoryError> {
        let placeholders = vec!["?"; purchases.len()].join(", ");
        let sql = format!(
            "SELECT purchase_id, product_id, product_name, category, sku, quantity, \
             unit_price, total_price FROM purchase_items WHERE purchase_id IN ({placeholders}) \
             ORDER BY id"
        );

        let mut query = sqlx::query(&sql);
        for purchase in purchases {
            query = query.bind(purchase.id.0.to_string());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut items_by_purchase: HashMap<String, Vec<PurchaseItem>> = HashMap::new();
        for row in &rows {
            let purchase_id: String = row.get("purchase_id");
            items_by_purchase.entry(purchase_id).or_default().push(item_from_row(row)?);
        }

        Ok(items_by_purchase)
    }
}

#[async_trait::async_trait]
impl PurchaseRepository for SqlPurchaseRepository {
    async fn create(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, user_id, customer_id, order_number, total_amount, currency,
                payment_method, payment_status, gateway_reference, transaction_date, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(purchase.id.0.to_string())
        .bind(purchase.user_id.0.to_string())
        .bind(&purchase.customer_id.0)
        .bind(&purchase.order_number)
        .bind(purchase.total_amount.to_string())
        .bind(&purchase.currency)
        .bind(purchase.payment_method.as_str())
        .bind(purchase.payment_status.as_str())
        .bind(purchase.gateway_reference.as_deref())
        .bind(purchase.transaction_date.to_rfc3339())
        .bind(purchase.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for item in &purchase.items {
            sqlx::query(
                r#"
                INSERT INTO purchase_items (
                    id, purchase_id, product_id, product_name, category, sku,
                    quantity, unit_price, total_price
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(purchase.id.0.to_string())
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(&item.category)
            .bind(item.sku.as_deref())
            .bind(item.quantity)
            .bind(item.unit_price.to_string())
            .bind(item.total_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let purchases = self
            .fetch_with_items("gateway_reference = ?", &[reference.to_string()], "", None)
            .await?;
        Ok(purchases.into_iter().next())
    }

    async fn set_status_by_reference(
        &self,
        reference: &str,
        status: PaymentStatus,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE purchases SET payment_status = ? WHERE gateway_reference = ?",
        )
        .bind(status.as_str())
        .bind(reference)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_reference(reference).await
    }

    async fn history_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        self.fetch_with_items(
            "user_id = ?",
            &[user_id.0.to_string()],
            "ORDER BY created_at DESC",
            Some(limit),
        )
        .await
    }

    async fn aggregate_completed_by_customer(
        &self,
    ) -> Result<Vec<PurchaseAggregate>, RepositoryError> {
        // Decimal sums happen in the aggregator, off the TEXT-stored amounts,
        // so category-level rounding never creeps in via SQL float math.
        let completed = self
            .fetch_with_items(
                "payment_status = ?",
                &[PaymentStatus::Completed.as_str().to_string()],
                "ORDER BY transaction_date, id",
                None,
            )
            .await?;

        Ok(aggregate_completed(&completed))
    }

    async fn analytics(&self, now: DateTime<Utc>) -> Result<PurchaseAnalytics, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM purchases").fetch_one(&self.pool).await?;

        let completed = self
            .fetch_with_items(
                "payment_status = ?",
                &[PaymentStatus::Completed.as_str().to_string()],
                "ORDER BY transaction_date, id",
                None,
            )
            .await?;

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

        let mut by_category: HashMap<&str, CategoryRevenue> = HashMap::new();
        for item in completed.iter().flat_map(|purchase| purchase.items.iter()) {
            let entry =
                by_category.entry(item.category.as_str()).or_insert_with(|| CategoryRevenue {
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
            total_purchases: total.max(0) as u64,
            completed_purchases: completed.len() as u64,
            completed_revenue,
            average_order_value,
            monthly_revenue: monthly,
            top_categories,
        })
    }
}

fn purchase_from_row(row: &SqliteRow) -> Result<Purchase, RepositoryError> {
    let method: String = row.get("payment_method");
    let status: String = row.get("payment_status");

    Ok(Purchase {
        id: PurchaseId(parse_uuid("purchases.id", &row.get::<String, _>("id"))?),
        user_id: UserId(parse_uuid("purchases.user_id", &row.get::<String, _>("user_id"))?),
        customer_id: CustomerId(row.get("customer_id")),
        order_number: row.get("order_number"),
        items: Vec::new(),
        total_amount: parse_decimal(
            "purchases.total_amount",
            &row.get::<String, _>("total_amount"),
        )?,
        currency: row.get("currency"),
        payment_method: PaymentMethod::parse(&method)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown payment method `{method}`")))?,
        payment_status: PaymentStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown payment status `{status}`")))?,
        gateway_reference: row.get("gateway_reference"),
        transaction_date: parse_datetime(
            "purchases.transaction_date",
            &row.get::<String, _>("transaction_date"),
        )?,
        created_at: parse_datetime("purchases.created_at", &row.get::<String, _>("created_at"))?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<PurchaseItem, RepositoryError> {
    Ok(PurchaseItem {
        product_id: row.get("product_id"),
        product_name: row.get("product_name"),
        category: row.get("category"),
        sku: row.get("sku"),
        quantity: row.get::<i64, _>("quantity").max(0) as u32,
        unit_price: parse_decimal(
            "purchase_items.unit_price",
            &row.get::<String, _>("unit_price"),
        )?,
        total_price: parse_decimal(
            "purchase_items.total_price",
            &row.get::<String, _>("total_price"),
        )?,
    })
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("{field}: invalid decimal: {error}")))
}
