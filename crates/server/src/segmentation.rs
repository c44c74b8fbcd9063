//! Segment definition CRUD, segmentation runs, and store-wide analytics.
//!
//! JSON API Endpoints:
//! - `POST   /api/segmentation/segments`      — create a definition (admin)
//! - `GET    /api/segmentation/segments`      — list active definitions
//! - `GET    /api/segmentation/segments/{id}` — fetch one, with assignments
//! - `PUT    /api/segmentation/segments/{id}` — update (admin)
//! - `DELETE /api/segmentation/segments/{id}` — soft-delete (admin)
//! - `POST   /api/segmentation/run`           — run rfm|kmeans and persist (admin)
//! - `GET    /api/segmentation/analytics`     — purchase analytics (admin)

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use segmint_core::domain::segment::{
    ModelInfo, SegmentCriteria, SegmentDefinition, SegmentId,
};
use segmint_core::errors::{ApplicationError, DomainError};
use segmint_core::segmentation::engine::{SegmentationEngine, SegmentationOutcome};
use segmint_db::repositories::{
    PurchaseAnalytics, PurchaseRepository, SegmentRepository, SegmentUpdate, StoredAssignment,
};

use crate::auth::{authenticate, require_admin, AuthContext};
use crate::respond::{application_error, error, ApiError};

#[derive(Clone)]
pub struct SegmentationState {
    pub auth: AuthContext,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub segments: Arc<dyn SegmentRepository>,
    pub engine: SegmentationEngine,
}

pub fn router(state: SegmentationState) -> Router {
    Router::new()
        .route(
            "/api/segmentation/segments",
            get(list_segments).post(create_segment),
        )
        .route(
            "/api/segmentation/segments/{id}",
            get(get_segment).put(update_segment).delete(delete_segment),
        )
        .route("/api/segmentation/run", post(run_segmentation))
        .route("/api/segmentation/analytics", get(analytics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSegmentRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub criteria: SegmentCriteria,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSegmentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub criteria: Option<SegmentCriteria>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RunSegmentationRequest {
    pub segment_id: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub k: Option<usize>,
}

fn default_algorithm() -> String {
    "rfm".to_string()
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    #[serde(flatten)]
    pub definition: SegmentDefinition,
}

#[derive(Debug, Serialize)]
pub struct SegmentDetailResponse {
    #[serde(flatten)]
    pub definition: SegmentDefinition,
    pub assignments: Vec<StoredAssignment>,
}

#[derive(Debug, Serialize)]
pub struct RunSegmentationResponse {
    pub segment: SegmentDefinition,
    #[serde(flatten)]
    pub outcome: SegmentationOutcome,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub total_users: u64,
    #[serde(flatten)]
    pub purchases: PurchaseAnalytics,
    /// Aggregate metrics over the latest assignment lists of active
    /// definitions that have been run at least once.
    pub segments_run: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_segment(
    State(state): State<SegmentationState>,
    headers: HeaderMap,
    Json(request): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<SegmentResponse>), ApiError> {
    let caller = require_admin(&state.auth, &headers).await?;

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Segment name is required."));
    }

    let now = Utc::now();
    let definition = SegmentDefinition {
        id: SegmentId(Uuid::new_v4()),
        name,
        description: request.description,
        criteria: request.criteria,
        model: ModelInfo::default(),
        latest_metrics: None,
        is_active: true,
        created_by: Some(caller.id),
        created_at: now,
        updated_at: now,
    };

    if let Err(source) = state.segments.create(&definition).await {
        if source.is_unique_violation() {
            return Err(error(StatusCode::CONFLICT, "Segment name already exists."));
        }
        return Err(application_error(ApplicationError::Persistence(source.to_string())));
    }

    Ok((StatusCode::CREATED, Json(SegmentResponse { definition })))
}

pub async fn list_segments(
    State(state): State<SegmentationState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SegmentResponse>>, ApiError> {
    authenticate(&state.auth, &headers).await?;

    let definitions = state
        .segments
        .list_active()
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    Ok(Json(
        definitions.into_iter().map(|definition| SegmentResponse { definition }).collect(),
    ))
}

pub async fn get_segment(
    State(state): State<SegmentationState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SegmentDetailResponse>, ApiError> {
    authenticate(&state.auth, &headers).await?;
    let id = parse_segment_id(&id)?;

    let definition = find_segment(&state, &id).await?;
    let assignments = state
        .segments
        .assignments(&id)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    Ok(Json(SegmentDetailResponse { definition, assignments }))
}

pub async fn update_segment(
    State(state): State<SegmentationState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateSegmentRequest>,
) -> Result<Json<SegmentResponse>, ApiError> {
    require_admin(&state.auth, &headers).await?;
    let id = parse_segment_id(&id)?;

    let updated = state
        .segments
        .update(
            &id,
            SegmentUpdate {
                name: request.name,
                description: request.description,
                criteria: request.criteria,
                is_active: request.is_active,
            },
        )
        .await
        .map_err(|source| {
            if source.is_unique_violation() {
                error(StatusCode::CONFLICT, "Segment name already exists.")
            } else {
                application_error(ApplicationError::Persistence(source.to_string()))
            }
        })?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Segment not found."))?;

    Ok(Json(SegmentResponse { definition: updated }))
}

pub async fn delete_segment(
    State(state): State<SegmentationState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_admin(&state.auth, &headers).await?;
    let id = parse_segment_id(&id)?;

    let removed = state
        .segments
        .deactivate(&id)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    if !removed {
        return Err(error(StatusCode::NOT_FOUND, "Segment not found."));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Aggregate → score → classify/cluster → report, then persist the full
/// assignment list against the definition in one write.
pub async fn run_segmentation(
    State(state): State<SegmentationState>,
    headers: HeaderMap,
    Json(request): Json<RunSegmentationRequest>,
) -> Result<Json<RunSegmentationResponse>, ApiError> {
    require_admin(&state.auth, &headers).await?;
    let id = parse_segment_id(&request.segment_id)?;

    find_segment(&state, &id).await?;

    let aggregates = state
        .purchases
        .aggregate_completed_by_customer()
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    let now = Utc::now();
    let outcome = state
        .engine
        .run(&request.algorithm, request.k, &aggregates, now)
        .map_err(|source| application_error(ApplicationError::from(DomainError::from(source))))?;

    let model = ModelInfo {
        algorithm: outcome.parameters.algorithm,
        parameters: serde_json::to_value(&outcome.parameters).unwrap_or(serde_json::Value::Null),
        last_trained: Some(now),
        accuracy: Some(outcome.accuracy),
    };
    state
        .segments
        .replace_assignments(&id, &model, &outcome.metrics, &outcome.assignments)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    let segment = find_segment(&state, &id).await?;

    info!(
        event_name = "segmentation.run.completed",
        segment_id = %id.0,
        algorithm = outcome.parameters.algorithm.as_str(),
        total_customers = outcome.parameters.total_customers,
        "segmentation run persisted"
    );

    Ok(Json(RunSegmentationResponse { segment, outcome }))
}

pub async fn analytics(
    State(state): State<SegmentationState>,
    headers: HeaderMap,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    require_admin(&state.auth, &headers).await?;

    let total_users = state
        .auth
        .users
        .count()
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;
    let purchases = state
        .purchases
        .analytics(Utc::now())
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    let definitions = state
        .segments
        .list_active()
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;
    let segments_run =
        definitions.iter().filter(|definition| definition.model.last_trained.is_some()).count();

    Ok(Json(AnalyticsResponse { total_users, purchases, segments_run }))
}

async fn find_segment(
    state: &SegmentationState,
    id: &SegmentId,
) -> Result<SegmentDefinition, ApiError> {
    state
        .segments
        .find_by_id(id)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Segment not found."))
}

fn parse_segment_id(raw: &str) -> Result<SegmentId, ApiError> {
    Uuid::parse_str(raw)
        .map(SegmentId)
        .map_err(|_| error(StatusCode::BAD_REQUEST, "Invalid segment id."))
}
