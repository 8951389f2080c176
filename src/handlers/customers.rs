use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::customer;
use crate::services::customers::RegisterCustomer;
use crate::services::referrals::ReferralSummary;
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RegisterCustomerRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    /// Referral code of the customer who referred this sign-up
    pub referral_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<customer::Model> for CustomerResponse {
    fn from(m: customer::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            name: m.name,
            referral_code: m.referral_code,
            referred_by: m.referred_by,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EntitlementsResponse {
    pub customer_id: Uuid,
    pub course_ids: Vec<Uuid>,
}

/// Register a customer
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    summary = "Register customer",
    description = "Registers a customer, generates their referral code and links the referrer when a code is supplied",
    request_body = RegisterCustomerRequest,
    responses(
        (status = 201, description = "Customer registered", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    )
)]
pub async fn register_customer(
    State(state): State<AppState>,
    Json(request): Json<RegisterCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ServiceError> {
    request.validate()?;

    let customer = state
        .services
        .customers
        .register(RegisterCustomer {
            email: request.email,
            name: request.name,
            referral_code: request.referral_code,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(customer.into())),
    ))
}

/// Get a customer's referral summary
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/referrals",
    summary = "Referral summary",
    description = "Reward points, available fee waivers and points remaining to the next waiver",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Summary retrieved", body = ApiResponse<ReferralSummary>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn referral_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReferralSummary>>, ServiceError> {
    let summary = state.services.referrals.summary(id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// List the courses a customer owns
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/entitlements",
    summary = "List entitlements",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Entitlements retrieved", body = ApiResponse<EntitlementsResponse>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_entitlements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<EntitlementsResponse>>, ServiceError> {
    // 404 for unknown customers instead of an empty grant list.
    state.services.customers.get_customer(id).await?;

    let grants = state.services.customers.entitlements(id).await?;
    Ok(Json(ApiResponse::success(EntitlementsResponse {
        customer_id: id,
        course_ids: grants.into_iter().map(|g| g.course_id).collect(),
    })))
}
