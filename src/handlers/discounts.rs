use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::discount_code;
use crate::services::discounts::CreateDiscountCode;
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateDiscountRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,

    /// Percent off in (0, 100]
    pub percent: Decimal,

    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,

    /// Usage cap; unlimited when omitted
    pub max_uses: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountCodeResponse {
    pub id: Uuid,
    pub code: String,
    pub percent: Decimal,
    pub active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
}

impl From<discount_code::Model> for DiscountCodeResponse {
    fn from(m: discount_code::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            percent: m.percent,
            active: m.active,
            valid_from: m.valid_from,
            valid_to: m.valid_to,
            max_uses: m.max_uses,
            current_uses: m.current_uses,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PreviewQuery {
    pub total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountPreviewResponse {
    pub code: String,
    pub percent: Decimal,
    pub original_total: Decimal,
    pub discount_total: Decimal,
    pub discounted_total: Decimal,
}

/// Create a discount code
#[utoipa::path(
    post,
    path = "/api/v1/discounts",
    summary = "Create discount code",
    description = "Creates a percent-off discount code; codes are stored uppercase",
    request_body = CreateDiscountRequest,
    responses(
        (status = 201, description = "Discount code created", body = ApiResponse<DiscountCodeResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_discount(
    State(state): State<AppState>,
    Json(request): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DiscountCodeResponse>>), ServiceError> {
    request.validate()?;

    let created = state
        .services
        .discounts
        .create_code(CreateDiscountCode {
            code: request.code,
            percent: request.percent,
            valid_from: request.valid_from,
            valid_to: request.valid_to,
            max_uses: request.max_uses,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created.into())),
    ))
}

/// Preview a discount against a total
#[utoipa::path(
    get,
    path = "/api/v1/discounts/{code}/preview",
    summary = "Preview discount",
    description = "Validates the code and returns the discounted total without consuming a use",
    params(
        ("code" = String, Path, description = "Discount code"),
        ("total" = Decimal, Query, description = "Basket total to discount"),
    ),
    responses(
        (status = 200, description = "Preview computed", body = ApiResponse<DiscountPreviewResponse>),
        (status = 422, description = "Code unknown, inactive or exhausted", body = crate::errors::ErrorResponse),
    )
)]
pub async fn preview_discount(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<ApiResponse<DiscountPreviewResponse>>, ServiceError> {
    if query.total < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "total must not be negative".to_string(),
        ));
    }

    let (discount, breakdown) = state
        .services
        .discounts
        .preview(&code, &[query.total])
        .await?;

    Ok(Json(ApiResponse::success(DiscountPreviewResponse {
        code: discount.code,
        percent: discount.percent,
        original_total: breakdown.original_total,
        discount_total: breakdown.discount_total,
        discounted_total: breakdown.discounted_total,
    })))
}
