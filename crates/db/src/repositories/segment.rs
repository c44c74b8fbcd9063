use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use segmint_core::domain::purchase::CustomerId;
use segmint_core::domain::segment::{
    Algorithm, ModelInfo, SegmentCriteria, SegmentDefinition, SegmentId,
};
use segmint_core::domain::user::UserId;
use segmint_core::segmentation::engine::Assignments;
use segmint_core::segmentation::metrics::SegmentMetrics;
use segmint_core::segmentation::rfm::RfmScores;

use super::{RepositoryError, SegmentRepository, SegmentUpdate};
use crate::repositories::user::{parse_datetime, parse_uuid};
use crate::DbPool;

/// Row shape of the persisted assignment list. RFM rows carry a segment name
/// and score triple; cluster rows carry a cluster index.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StoredAssignment {
    pub customer_id: CustomerId,
    pub score: u32,
    pub segment_name: Option<String>,
    pub cluster_index: Option<usize>,
    pub rfm_scores: Option<RfmScores>,
    pub assigned_at: DateTime<Utc>,
}

pub struct SqlSegmentRepository {
    pool: DbPool,
}

impl SqlSegmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SegmentRepository for SqlSegmentRepository {
    async fn create(&self, definition: &SegmentDefinition) -> Result<(), RepositoryError> {
        let criteria = serde_json::to_string(&definition.criteria)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let parameters = match &definition.model.parameters {
            serde_json::Value::Null => None,
            value => Some(
                serde_json::to_string(value)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?,
            ),
        };

        let metrics = definition
            .latest_metrics
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO segments (
                id, name, description, criteria, algorithm, parameters,
                last_trained, accuracy, metrics, is_active, created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(definition.id.0.to_string())
        .bind(&definition.name)
        .bind(definition.description.as_deref())
        .bind(criteria)
        .bind(definition.model.algorithm.as_str())
        .bind(parameters)
        .bind(definition.model.last_trained.map(|at| at.to_rfc3339()))
        .bind(definition.model.accuracy)
        .bind(metrics)
        .bind(definition.is_active)
        .bind(definition.created_by.as_ref().map(|id| id.0.to_string()))
        .bind(definition.created_at.to_rfc3339())
        .bind(definition.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SegmentId,
    ) -> Result<Option<SegmentDefinition>, RepositoryError> {
        let row = sqlx::query(&format!("{SEGMENT_COLUMNS} WHERE id = ?"))
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| definition_from_row(&row)).transpose()
    }

    async fn list_active(&self) -> Result<Vec<SegmentDefinition>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SEGMENT_COLUMNS} WHERE is_active = 1 ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(definition_from_row).collect()
    }

    async fn update(
        &self,
        id: &SegmentId,
        update: SegmentUpdate,
    ) -> Result<Option<SegmentDefinition>, RepositoryError> {
        let existing = match self.find_by_id(id).await? {
            Some(definition) => definition,
            None => return Ok(None),
        };

        let name = update.name.unwrap_or(existing.name);
        let description = update.description.or(existing.description);
        let criteria = update.criteria.unwrap_or(existing.criteria);
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let updated_at = Utc::now();

        let criteria_json = serde_json::to_string(&criteria)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "UPDATE segments SET name = ?, description = ?, criteria = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(description.as_deref())
        .bind(criteria_json)
        .bind(is_active)
        .bind(updated_at.to_rfc3339())
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(Some(SegmentDefinition {
            name,
            description,
            criteria,
            is_active,
            updated_at,
            ..existing
        }))
    }

    async fn deactivate(&self, id: &SegmentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE segments SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_assignments(
        &self,
        id: &SegmentId,
        model: &ModelInfo,
        metrics: &SegmentMetrics,
        assignments: &Assignments,
    ) -> Result<(), RepositoryError> {
        let parameters = serde_json::to_string(&model.parameters)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let metrics_json = serde_json::to_string(metrics)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segment_assignments WHERE segment_id = ?")
            .bind(id.0.to_string())
            .execute(&mut *tx)
            .await?;

        match assignments {
            Assignments::Rfm(list) => {
                for assignment in list {
                    sqlx::query(
                        r#"
                        INSERT INTO segment_assignments (
                            id, segment_id, customer_id, score, segment_name,
                            rfm_recency, rfm_frequency, rfm_monetary, assigned_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(id.0.to_string())
                    .bind(&assignment.customer_id.0)
                    .bind(assignment.score)
                    .bind(&assignment.segment_name)
                    .bind(assignment.rfm_scores.recency)
                    .bind(assignment.rfm_scores.frequency)
                    .bind(assignment.rfm_scores.monetary)
                    .bind(assignment.assigned_at.to_rfc3339())
                    .execute(&mut *tx)
                    .await?;
                }
            }
            Assignments::Clusters(list) => {
                for assignment in list {
                    sqlx::query(
                        r#"
                        INSERT INTO segment_assignments (
                            id, segment_id, customer_id, score, cluster_index, assigned_at
                        ) VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(id.0.to_string())
                    .bind(&assignment.customer_id.0)
                    .bind(assignment.score)
                    .bind(assignment.cluster_index as i64)
                    .bind(assignment.assigned_at.to_rfc3339())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        sqlx::query(
            "UPDATE segments SET algorithm = ?, parameters = ?, last_trained = ?, accuracy = ?, metrics = ?, updated_at = ? WHERE id = ?",
        )
        .bind(model.algorithm.as_str())
        .bind(parameters)
        .bind(model.last_trained.map(|at| at.to_rfc3339()))
        .bind(model.accuracy)
        .bind(metrics_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn assignments(
        &self,
        id: &SegmentId,
    ) -> Result<Vec<StoredAssignment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT customer_id, score, segment_name, cluster_index,
                   rfm_recency, rfm_frequency, rfm_monetary, assigned_at
            FROM segment_assignments
            WHERE segment_id = ?
            ORDER BY score DESC, customer_id
            "#,
        )
        .bind(id.0.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(assignment_from_row).collect()
    }
}

const SEGMENT_COLUMNS: &str = "SELECT id, name, description, criteria, algorithm, parameters, last_trained, accuracy, metrics, is_active, created_by, created_at, updated_at FROM segments";

fn definition_from_row(row: &SqliteRow) -> Result<SegmentDefinition, RepositoryError> {
    let algorithm: String = row.get("algorithm");
    let criteria_raw: String = row.get("criteria");
    let criteria: SegmentCriteria = serde_json::from_str(&criteria_raw)
        .map_err(|error| RepositoryError::Decode(format!("segments.criteria: {error}")))?;
    let parameters = match row.get::<Option<String>, _>("parameters") {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|error| RepositoryError::Decode(format!("segments.parameters: {error}")))?,
        None => serde_json::Value::Null,
    };
    let last_trained = row
        .get::<Option<String>, _>("last_trained")
        .map(|raw| parse_datetime("segments.last_trained", &raw))
        .transpose()?;
    let latest_metrics = row
        .get::<Option<String>, _>("metrics")
        .map(|raw| {
            serde_json::from_str::<SegmentMetrics>(&raw)
                .map_err(|error| RepositoryError::Decode(format!("segments.metrics: {error}")))
        })
        .transpose()?;
    let created_by = row
        .get::<Option<String>, _>("created_by")
        .map(|raw| parse_uuid("segments.created_by", &raw).map(UserId))
        .transpose()?;

    Ok(SegmentDefinition {
        id: SegmentId(parse_uuid("segments.id", &row.get::<String, _>("id"))?),
        name: row.get("name"),
        description: row.get("description"),
        criteria,
        model: ModelInfo {
            algorithm: Algorithm::parse(&algorithm).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown algorithm `{algorithm}`"))
            })?,
            parameters,
            last_trained,
            accuracy: row.get("accuracy"),
        },
        latest_metrics,
        is_active: row.get::<i64, _>("is_active") != 0,
        created_by,
        created_at: parse_datetime("segments.created_at", &row.get::<String, _>("created_at"))?,
        updated_at: parse_datetime("segments.updated_at", &row.get::<String, _>("updated_at"))?,
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<StoredAssignment, RepositoryError> {
    let rfm_scores = match (
        row.get::<Option<i64>, _>("rfm_recency"),
        row.get::<Option<i64>, _>("rfm_frequency"),
        row.get::<Option<i64>, _>("rfm_monetary"),
    ) {
        (Some(recency), Some(frequency), Some(monetary)) => Some(RfmScores {
            recency: recency as u8,
            frequency: frequency as u8,
            monetary: monetary as u8,
        }),
        _ => None,
    };

    Ok(StoredAssignment {
        customer_id: CustomerId(row.get("customer_id")),
        score: row.get::<i64, _>("score").max(0) as u32,
        segment_name: row.get("segment_name"),
        cluster_index: row.get::<Option<i64>, _>("cluster_index").map(|index| index.max(0) as usize),
        rfm_scores,
        assigned_at: parse_datetime(
            "segment_assignments.assigned_at",
            &row.get::<String, _>("assigned_at"),
        )?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use segmint_core::domain::purchase::CustomerId;
    use segmint_core::domain::segment::{
        Algorithm, ModelInfo, SegmentCriteria, SegmentDefinition, SegmentId,
    };
    use segmint_core::segmentation::classify::SegmentAssignment;
    use segmint_core::segmentation::cluster::ClusterAssignment;
    use segmint_core::segmentation::engine::Assignments;
    use segmint_core::segmentation::rfm::RfmScores;

    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{SegmentRepository, SegmentUpdate};

    use super::SqlSegmentRepository;

    async fn repo() -> SqlSegmentRepository {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        run_pending(&pool).await.expect("migrations");
        SqlSegmentRepository::new(pool)
    }

    fn definition(name: &str) -> SegmentDefinition {
        let now = Utc::now();
        SegmentDefinition {
            id: SegmentId(Uuid::new_v4()),
            name: name.to_string(),
            description: Some("high-value cohort".to_string()),
            criteria: SegmentCriteria::default(),
            model: ModelInfo::default(),
            latest_metrics: None,
            is_active: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn metrics_for(assignments: &Assignments) -> segmint_core::SegmentMetrics {
        match assignments {
            Assignments::Rfm(list) => {
                segmint_core::report_segments(list).expect("non-empty assignments")
            }
            Assignments::Clusters(list) => {
                segmint_core::report_clusters(list).expect("non-empty assignments")
            }
        }
    }

    fn rfm_assignment(customer: &str, score: u32, segment_name: &str) -> SegmentAssignment {
        SegmentAssignment {
            customer_id: CustomerId(customer.to_string()),
            score,
            segment_name: segment_name.to_string(),
            rfm_scores: RfmScores { recency: 4, frequency: 4, monetary: 4 },
            assigned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_find_round_trip() {
        let repo = repo().await;
        let definition = definition(&format!("seg-{}", Uuid::new_v4().simple()));

        repo.create(&definition).await.expect("create");
        let found =
            repo.find_by_id(&definition.id).await.expect("find").expect("definition present");

        assert_eq!(found.name, definition.name);
        assert_eq!(found.model.algorithm, Algorithm::Rfm);
        assert!(found.model.accuracy.is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_unique_violation() {
        let repo = repo().await;
        let name = format!("seg-{}", Uuid::new_v4().simple());
        repo.create(&definition(&name)).await.expect("first");

        let error = repo.create(&definition(&name)).await.expect_err("second must fail");

        assert!(error.is_unique_violation());
    }

    #[tokio::test]
    async fn replace_assignments_swaps_the_whole_list() {
        let repo = repo().await;
        let definition = definition(&format!("seg-{}", Uuid::new_v4().simple()));
        repo.create(&definition).await.expect("create");

        let first_run = Assignments::Rfm(vec![
            rfm_assignment("a@example.com", 100, "Champions"),
            rfm_assignment("b@example.com", 60, "Potential Loyalists"),
        ]);
        let model = ModelInfo {
            algorithm: Algorithm::Rfm,
            parameters: serde_json::json!({"total_customers": 2}),
            last_trained: Some(Utc::now()),
            accuracy: Some(0.85),
        };
        repo.replace_assignments(&definition.id, &model, &metrics_for(&first_run), &first_run)
            .await
            .expect("first replace");

        let second_run =
            Assignments::Rfm(vec![rfm_assignment("c@example.com", 20, "Lost Customers")]);
        repo.replace_assignments(&definition.id, &model, &metrics_for(&second_run), &second_run)
            .await
            .expect("second replace");

        let stored = repo.assignments(&definition.id).await.expect("assignments");
        assert_eq!(stored.len(), 1, "re-running replaces, never merges");
        assert_eq!(stored[0].customer_id.0, "c@example.com");
        assert_eq!(stored[0].segment_name.as_deref(), Some("Lost Customers"));
        assert_eq!(
            stored[0].rfm_scores,
            Some(RfmScores { recency: 4, frequency: 4, monetary: 4 })
        );

        let reloaded =
            repo.find_by_id(&definition.id).await.expect("find").expect("present");
        assert_eq!(reloaded.model.accuracy, Some(0.85));
        assert!(reloaded.model.last_trained.is_some());
        let metrics = reloaded.latest_metrics.expect("metrics stored with the run");
        assert_eq!(metrics.total_customers, 1);
        assert_eq!(metrics.average_score, 20.0);
    }

    #[tokio::test]
    async fn cluster_assignments_round_trip_without_rfm_fields() {
        let repo = repo().await;
        let definition = definition(&format!("seg-{}", Uuid::new_v4().simple()));
        repo.create(&definition).await.expect("create");

        let run = Assignments::Clusters(vec![ClusterAssignment {
            customer_id: CustomerId("k@example.com".to_string()),
            score: 75,
            cluster_index: 2,
            assigned_at: Utc::now(),
        }]);
        let model = ModelInfo {
            algorithm: Algorithm::Kmeans,
            parameters: serde_json::json!({"k": 4}),
            last_trained: Some(Utc::now()),
            accuracy: Some(0.78),
        };

        repo.replace_assignments(&definition.id, &model, &metrics_for(&run), &run)
            .await
            .expect("replace");

        let stored = repo.assignments(&definition.id).await.expect("assignments");
        assert_eq!(stored[0].cluster_index, Some(2));
        assert!(stored[0].segment_name.is_none());
        assert!(stored[0].rfm_scores.is_none());
    }

    #[tokio::test]
    async fn deactivated_segments_leave_the_active_listing() {
        let repo = repo().await;
        let definition = definition(&format!("seg-{}", Uuid::new_v4().simple()));
        repo.create(&definition).await.expect("create");

        assert!(repo.deactivate(&definition.id).await.expect("deactivate"));

        let listed = repo.list_active().await.expect("list");
        assert!(listed.iter().all(|d| d.id != definition.id));
    }

    #[tokio::test]
    async fn update_changes_only_provided_fields() {
        let repo = repo().await;
        let definition = definition(&format!("seg-{}", Uuid::new_v4().simple()));
        repo.create(&definition).await.expect("create");

        let updated = repo
            .update(
                &definition.id,
                SegmentUpdate {
                    description: Some("renamed cohort".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("present");

        assert_eq!(updated.name, definition.name);
        assert_eq!(updated.description.as_deref(), Some("renamed cohort"));
    }
}
