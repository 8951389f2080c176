use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{payment_record, transaction};
use crate::services::gateway::PaymentNotification;
use crate::services::settlements::{CheckoutItem, StartCheckout, StartedCheckout};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct StartCheckoutRequest {
    pub customer_id: Uuid,

    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CheckoutItemRequest>,

    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutItemRequest {
    pub course_id: Uuid,
    pub title: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SimulateSettlementRequest {
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub original_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<transaction::Model> for TransactionResponse {
    fn from(m: transaction::Model) -> Self {
        Self {
            id: m.id,
            customer_id: m.customer_id,
            status: m.status.to_string(),
            original_total: m.original_total,
            discount_total: m.discount_total,
            total: m.total,
            currency: m.currency,
            gateway_order_id: m.gateway_order_id,
            created_at: m.created_at,
            completed_at: m.completed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentRecordResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub amount: Decimal,
    pub discount_share: Decimal,
    pub final_amount: Decimal,
    pub status: String,
    pub invoiced: bool,
}

impl From<payment_record::Model> for PaymentRecordResponse {
    fn from(m: payment_record::Model) -> Self {
        Self {
            id: m.id,
            course_id: m.course_id,
            course_title: m.course_title,
            amount: m.amount,
            discount_share: m.discount_share,
            final_amount: m.final_amount,
            status: m.status.to_string(),
            invoiced: m.invoiced,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionDetailsResponse {
    pub transaction: TransactionResponse,
    pub records: Vec<PaymentRecordResponse>,
}

/// Start a checkout and register it with the payment gateway
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Start checkout",
    description = "Creates a transaction over the cart items, applies an optional discount code and returns the gateway redirect URL",
    request_body = StartCheckoutRequest,
    responses(
        (status = 201, description = "Checkout started", body = ApiResponse<StartedCheckout>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Discount code rejected", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway registration failed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn start_checkout(
    State(state): State<AppState>,
    Json(request): Json<StartCheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StartedCheckout>>), ServiceError> {
    request.validate()?;

    let input = StartCheckout {
        customer_id: request.customer_id,
        items: request
            .items
            .into_iter()
            .map(|i| CheckoutItem {
                course_id: i.course_id,
                title: i.title,
                amount: i.amount,
            })
            .collect(),
        discount_code: request.discount_code,
    };

    let started = state.services.settlements.start_checkout(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(started))))
}

/// Gateway settlement callback
///
/// The body is taken raw and parsed by hand so a malformed payload is a 400
/// under our error envelope rather than an axum rejection. The success body
/// is the bare string the gateway expects, not the JSON envelope.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/callback",
    summary = "Gateway settlement callback",
    description = "Verifies the notification signature and settles the transaction; replays of settled transactions are acknowledged",
    request_body = PaymentNotification,
    responses(
        (status = 200, description = "Settlement acknowledged", body = String),
        (status = 400, description = "Malformed notification", body = crate::errors::ErrorResponse),
        (status = 401, description = "Bad signature", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transaction not in a settleable state", body = crate::errors::ErrorResponse),
    )
)]
pub async fn gateway_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ServiceError> {
    let notification: PaymentNotification = serde_json::from_slice(&body).map_err(|e| {
        ServiceError::ValidationError(format!("Malformed gateway notification: {}", e))
    })?;

    state
        .services
        .settlements
        .confirm_settlement(&notification)
        .await?;

    Ok((StatusCode::OK, "OK"))
}

/// Settle a transaction without a gateway callback
#[utoipa::path(
    post,
    path = "/api/v1/checkout/simulate",
    summary = "Simulate settlement",
    description = "Settles a registered transaction without gateway verification; only available when allow_simulated_settlement is enabled",
    request_body = SimulateSettlementRequest,
    responses(
        (status = 200, description = "Transaction settled", body = ApiResponse<TransactionDetailsResponse>),
        (status = 400, description = "Simulation disabled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transaction already terminal", body = crate::errors::ErrorResponse),
    )
)]
pub async fn simulate_settlement(
    State(state): State<AppState>,
    Json(request): Json<SimulateSettlementRequest>,
) -> Result<Json<ApiResponse<TransactionDetailsResponse>>, ServiceError> {
    state
        .services
        .settlements
        .simulate_settlement(request.transaction_id)
        .await?;

    let details = state
        .services
        .settlements
        .get_transaction(request.transaction_id)
        .await?;

    Ok(Json(ApiResponse::success(TransactionDetailsResponse {
        transaction: details.transaction.into(),
        records: details.records.into_iter().map(Into::into).collect(),
    })))
}

/// Get a transaction with its payment records
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    summary = "Get transaction",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction retrieved", body = ApiResponse<TransactionDetailsResponse>),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransactionDetailsResponse>>, ServiceError> {
    let details = state.services.settlements.get_transaction(id).await?;

    Ok(Json(ApiResponse::success(TransactionDetailsResponse {
        transaction: details.transaction.into(),
        records: details.records.into_iter().map(Into::into).collect(),
    })))
}

/// List a customer's transactions
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/transactions",
    summary = "List customer transactions",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Transactions retrieved", body = ApiResponse<PaginatedResponse<TransactionResponse>>),
    )
)]
pub async fn list_customer_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransactionResponse>>>, ServiceError> {
    let limit = query.limit.min(state.config.api_max_page_size as u64).max(1);
    let (items, total) = state
        .services
        .settlements
        .list_customer_transactions(id, query.page, limit)
        .await?;

    let total_pages = (total + limit - 1) / limit;
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: items.into_iter().map(Into::into).collect(),
        total,
        page: query.page,
        limit,
        total_pages,
    })))
}
