//! Payment-gateway glue: hosted-checkout initialization, verification,
//! signed webhook ingest, purchase history, and refunds.
//!
//! The gateway is a hosted Paystack-style API: amounts cross the wire in
//! minor units, and a transaction is trusted only after `verify` or a
//! signature-checked webhook confirms it.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use segmint_core::auth::hmac_hex;
use segmint_core::config::GatewayConfig;
use segmint_core::domain::purchase::{
    CustomerId, PaymentMethod, PaymentStatus, Purchase, PurchaseId, PurchaseItem,
};
use segmint_core::errors::ApplicationError;
use segmint_db::repositories::PurchaseRepository;

use crate::auth::{authenticate, require_admin, AuthContext};
use crate::respond::{application_error, error, ApiError};

const WEBHOOK_SIGNATURE_HEADER: &str = "x-gateway-signature";
const HISTORY_DEFAULT_LIMIT: u32 = 50;
const HISTORY_MAX_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct PaymentsState {
    pub auth: AuthContext,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub gateway: Arc<GatewayClient>,
}

pub fn router(state: PaymentsState) -> Router {
    Router::new()
        .route("/api/payments/initialize", post(initialize_payment))
        .route("/api/payments/verify/{reference}", get(verify_payment))
        .route("/api/payments/webhook", post(webhook_ingest))
        .route("/api/payments/history", get(payment_history))
        .route("/api/payments/refund", post(refund_payment))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Gateway client
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    Disabled,
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedTransaction {
    pub status: String,
    pub reference: String,
    pub amount: i64,
    pub paid_at: Option<String>,
}

pub struct GatewayClient {
    http: Client,
    base_url: String,
    secret_key: Option<SecretString>,
    webhook_secret: Option<String>,
    callback_url: Option<String>,
    currency: String,
    enabled: bool,
}

impl GatewayClient {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            callback_url: config.callback_url.clone(),
            currency: config.currency.clone(),
            enabled: config.enabled,
        }
    }

    fn secret(&self) -> Result<&str, GatewayError> {
        if !self.enabled {
            return Err(GatewayError::Disabled);
        }
        self.secret_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or(GatewayError::Disabled)
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub async fn initialize(
        &self,
        email: &str,
        amount_minor: i64,
    ) -> Result<InitializedTransaction, GatewayError> {
        let secret = self.secret()?;
        let mut payload = serde_json::json!({
            "email": email,
            "amount": amount_minor,
            "currency": self.currency,
        });
        if let Some(callback_url) = &self.callback_url {
            payload["callback_url"] = serde_json::Value::String(callback_url.clone());
        }

        let envelope: GatewayEnvelope<InitializedTransaction> = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(secret)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        match envelope {
            GatewayEnvelope { status: true, data: Some(data), .. } => Ok(data),
            GatewayEnvelope { message, .. } => Err(GatewayError::Rejected(
                message.unwrap_or_else(|| "initialization failed".to_string()),
            )),
        }
    }

    pub async fn verify(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError> {
        let secret = self.secret()?;

        let envelope: GatewayEnvelope<VerifiedTransaction> = self
            .http
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(secret)
            .send()
            .await?
            .json()
            .await?;

        match envelope {
            GatewayEnvelope { status: true, data: Some(data), .. } => Ok(data),
            GatewayEnvelope { message, .. } => Err(GatewayError::Rejected(
                message.unwrap_or_else(|| "verification failed".to_string()),
            )),
        }
    }

    pub async fn refund(&self, reference: &str, amount_minor: i64) -> Result<(), GatewayError> {
        let secret = self.secret()?;

        let envelope: GatewayEnvelope<serde_json::Value> = self
            .http
            .post(format!("{}/refund", self.base_url))
            .bearer_auth(secret)
            .json(&serde_json::json!({
                "transaction": reference,
                "amount": amount_minor,
            }))
            .send()
            .await?
            .json()
            .await?;

        if envelope.status {
            Ok(())
        } else {
            Err(GatewayError::Rejected(
                envelope.message.unwrap_or_else(|| "refund failed".to_string()),
            ))
        }
    }
}

fn gateway_error(source: GatewayError) -> ApiError {
    match source {
        GatewayError::Disabled => {
            error(StatusCode::SERVICE_UNAVAILABLE, "Payments are not configured.")
        }
        GatewayError::Rejected(message) => error(StatusCode::UNPROCESSABLE_ENTITY, message),
        GatewayError::Http(source) => {
            application_error(ApplicationError::Integration(source.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct InitializePaymentResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
    pub purchase_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub verified: bool,
    pub purchase: Purchase,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reference: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
struct WebhookEventData {
    reference: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn initialize_payment(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<(StatusCode, Json<InitializePaymentResponse>), ApiError> {
    let caller = authenticate(&state.auth, &headers).await?;

    let amount_minor = to_minor_units(request.amount)
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Amount must be a positive value."))?;

    let transaction = state
        .gateway
        .initialize(&caller.email, amount_minor)
        .await
        .map_err(gateway_error)?;

    let now = Utc::now();
    let purchase = Purchase {
        id: PurchaseId(Uuid::new_v4()),
        user_id: caller.id.clone(),
        customer_id: CustomerId(caller.email.clone()),
        order_number: order_number(now),
        items: request
            .items
            .into_iter()
            .map(|item| PurchaseItem {
                total_price: item.unit_price * Decimal::from(item.quantity),
                product_id: item.product_id,
                product_name: item.product_name,
                category: item.category,
                sku: item.sku,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
        total_amount: request.amount,
        currency: state.gateway.currency.clone(),
        payment_method: PaymentMethod::Card,
        payment_status: PaymentStatus::Pending,
        gateway_reference: Some(transaction.reference.clone()),
        transaction_date: now,
        created_at: now,
    };

    state
        .purchases
        .create(&purchase)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    info!(
        event_name = "payments.initialize.succeeded",
        purchase_id = %purchase.id.0,
        reference = %transaction.reference,
        "payment initialized"
    );

    Ok((
        StatusCode::CREATED,
        Json(InitializePaymentResponse {
            authorization_url: transaction.authorization_url,
            access_code: transaction.access_code,
            reference: transaction.reference,
            purchase_id: purchase.id.0.to_string(),
        }),
    ))
}

pub async fn verify_payment(
    State(state): State<PaymentsState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    authenticate(&state.auth, &headers).await?;

    let transaction = state.gateway.verify(&reference).await.map_err(gateway_error)?;
    if transaction.status != "success" {
        return Err(error(StatusCode::UNPROCESSABLE_ENTITY, "Payment verification failed."));
    }

    let purchase = state
        .purchases
        .set_status_by_reference(&reference, PaymentStatus::Completed)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "No purchase for this reference."))?;

    Ok(Json(VerifyPaymentResponse { verified: true, purchase }))
}

/// Signature-checked gateway callback. Unknown events are acknowledged and
/// ignored so the gateway stops retrying them.
pub async fn webhook_ingest(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let Some(secret) = state.gateway.webhook_secret() else {
        return Err(error(StatusCode::SERVICE_UNAVAILABLE, "Webhook ingestion is not configured."));
    };

    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Missing webhook signature."))?;

    if hmac_hex(secret.as_bytes(), body.as_bytes()) != signature {
        warn!(event_name = "payments.webhook.bad_signature", "webhook signature mismatch");
        return Err(error(StatusCode::UNAUTHORIZED, "Invalid webhook signature."));
    }

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|_| error(StatusCode::BAD_REQUEST, "Malformed webhook payload."))?;

    let status = match event.event.as_str() {
        "charge.success" => PaymentStatus::Completed,
        "charge.failed" => PaymentStatus::Failed,
        _ => return Ok(StatusCode::OK),
    };

    let updated = state
        .purchases
        .set_status_by_reference(&event.data.reference, status)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    if updated.is_none() {
        warn!(
            event_name = "payments.webhook.unknown_reference",
            reference = %event.data.reference,
            "webhook for unknown purchase reference"
        );
    }

    Ok(StatusCode::OK)
}

pub async fn payment_history(
    State(state): State<PaymentsState>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Purchase>>, ApiError> {
    let caller = authenticate(&state.auth, &headers).await?;
    let limit = query.limit.unwrap_or(HISTORY_DEFAULT_LIMIT).min(HISTORY_MAX_LIMIT);

    let purchases = state
        .purchases
        .history_for_user(&caller.id, limit)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?;

    Ok(Json(purchases))
}

pub async fn refund_payment(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    Json(request): Json<RefundRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    require_admin(&state.auth, &headers).await?;

    let amount_minor = to_minor_units(request.amount)
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Amount must be a positive value."))?;

    state
        .purchases
        .find_by_reference(&request.reference)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "No purchase for this reference."))?;

    state
        .gateway
        .refund(&request.reference, amount_minor)
        .await
        .map_err(gateway_error)?;

    let purchase = state
        .purchases
        .set_status_by_reference(&request.reference, PaymentStatus::Refunded)
        .await
        .map_err(|source| application_error(ApplicationError::Persistence(source.to_string())))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "No purchase for this reference."))?;

    info!(
        event_name = "payments.refund.succeeded",
        reference = %request.reference,
        "refund processed"
    );

    Ok(Json(VerifyPaymentResponse { verified: true, purchase }))
}

/// Major → minor units (pesewas/cents). Rejects non-positive amounts and
/// anything that cannot be represented exactly.
fn to_minor_units(amount: Decimal) -> Option<i64> {
    if amount <= Decimal::ZERO {
        return None;
    }
    let minor = amount * Decimal::from(100);
    if minor.fract() != Decimal::ZERO {
        return None;
    }
    minor.to_i64()
}

fn order_number(now: chrono::DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_ascii_uppercase();
    format!("ORD-{}-{suffix}", now.format("%Y%m%d"))
}
