use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::invoice_request;
use crate::services::invoicing::{ProcessDecision, RequestInvoice};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RequestInvoiceRequest {
    pub customer_id: Uuid,

    #[validate(length(min = 1, message = "at least one payment record is required"))]
    pub payment_ids: Vec<Uuid>,

    #[validate(length(min = 1, max = 200))]
    pub buyer_name: String,

    #[validate(length(min = 1, max = 300))]
    pub buyer_address: String,

    #[validate(length(min = 1, max = 20))]
    pub buyer_postal_code: String,

    #[validate(length(min = 1, max = 100))]
    pub buyer_city: String,

    /// Polish tax id; required for approval of company purchases
    pub buyer_nip: Option<String>,

    #[serde(default)]
    pub company: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProcessInvoiceRequest {
    pub approve: bool,
    /// Required when rejecting
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceRequestResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub buyer_name: String,
    pub buyer_nip: Option<String>,
    pub company: bool,
    pub payment_ids: Vec<Uuid>,
    pub total: Decimal,
    pub invoice_number: Option<String>,
    pub document_path: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<invoice_request::Model> for InvoiceRequestResponse {
    fn from(m: invoice_request::Model) -> Self {
        let payment_ids = serde_json::from_value(m.payment_ids.clone()).unwrap_or_default();
        Self {
            id: m.id,
            customer_id: m.customer_id,
            status: m.status.to_string(),
            buyer_name: m.buyer_name,
            buyer_nip: m.buyer_nip,
            company: m.company,
            payment_ids,
            total: m.total,
            invoice_number: m.invoice_number,
            document_path: m.document_path,
            comment: m.comment,
            created_at: m.created_at,
            processed_at: m.processed_at,
        }
    }
}

/// Request an invoice over settled payment records
#[utoipa::path(
    post,
    path = "/api/v1/invoices/requests",
    summary = "Request invoice",
    description = "Creates a pending invoice request over settled, not yet invoiced payment records",
    request_body = RequestInvoiceRequest,
    responses(
        (status = 201, description = "Request created", body = ApiResponse<InvoiceRequestResponse>),
        (status = 400, description = "Invalid billing data or ineligible records", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment records not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn request_invoice(
    State(state): State<AppState>,
    Json(request): Json<RequestInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceRequestResponse>>), ServiceError> {
    request.validate()?;

    let created = state
        .services
        .invoicing
        .request_invoice(RequestInvoice {
            customer_id: request.customer_id,
            payment_ids: request.payment_ids,
            buyer_name: request.buyer_name,
            buyer_address: request.buyer_address,
            buyer_postal_code: request.buyer_postal_code,
            buyer_city: request.buyer_city,
            buyer_nip: request.buyer_nip,
            company: request.company,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created.into())),
    ))
}

/// List pending invoice requests (review queue)
#[utoipa::path(
    get,
    path = "/api/v1/invoices/requests/pending",
    summary = "Pending invoice requests",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Queue retrieved", body = ApiResponse<PaginatedResponse<InvoiceRequestResponse>>),
    )
)]
pub async fn pending_invoice_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<InvoiceRequestResponse>>>, ServiceError> {
    let limit = query.limit.min(state.config.api_max_page_size as u64).max(1);
    let (items, total) = state
        .services
        .invoicing
        .pending_queue(query.page, limit)
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

/// Approve or reject an invoice request
#[utoipa::path(
    post,
    path = "/api/v1/invoices/requests/{id}/process",
    summary = "Process invoice request",
    description = "Approval issues the invoice number and document; rejection requires a comment",
    params(("id" = Uuid, Path, description = "Invoice request id")),
    request_body = ProcessInvoiceRequest,
    responses(
        (status = 200, description = "Request processed", body = ApiResponse<InvoiceRequestResponse>),
        (status = 400, description = "Missing rejection comment or invalid NIP", body = crate::errors::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Request already processed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn process_invoice_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProcessInvoiceRequest>,
) -> Result<Json<ApiResponse<InvoiceRequestResponse>>, ServiceError> {
    let decision = if request.approve {
        ProcessDecision::Approve
    } else {
        ProcessDecision::Reject {
            comment: request.comment.unwrap_or_default(),
        }
    };

    let processed = state.services.invoicing.process(id, decision).await?;
    Ok(Json(ApiResponse::success(processed.into())))
}

/// Get an invoice request
#[utoipa::path(
    get,
    path = "/api/v1/invoices/requests/{id}",
    summary = "Get invoice request",
    params(("id" = Uuid, Path, description = "Invoice request id")),
    responses(
        (status = 200, description = "Request retrieved", body = ApiResponse<InvoiceRequestResponse>),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_invoice_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceRequestResponse>>, ServiceError> {
    let request = state.services.invoicing.get_request(id).await?;
    Ok(Json(ApiResponse::success(request.into())))
}

/// List a customer's invoice requests
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/invoices",
    summary = "List customer invoice requests",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Requests retrieved", body = ApiResponse<PaginatedResponse<InvoiceRequestResponse>>),
    )
)]
pub async fn list_customer_invoices(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<InvoiceRequestResponse>>>, ServiceError> {
    let limit = query.limit.min(state.config.api_max_page_size as u64).max(1);
    let (items, total) = state
        .services
        .invoicing
        .list_customer_requests(id, query.page, limit)
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

/// Download a stored invoice document
#[utoipa::path(
    get,
    path = "/api/v1/invoices/documents/{customer_id}/{number}",
    summary = "Download invoice document",
    description = "Returns the stored plain-text invoice; the number may contain slashes (FV/2025/03/00001)",
    params(
        ("customer_id" = Uuid, Path, description = "Customer (payer) id"),
        ("number" = String, Path, description = "Invoice number"),
    ),
    responses(
        (status = 200, description = "Document content", body = String, content_type = "text/plain"),
        (status = 404, description = "Document not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn download_invoice_document(
    State(state): State<AppState>,
    Path((customer_id, number)): Path<(Uuid, String)>,
) -> Result<Response, ServiceError> {
    let content = state.services.documents.load(customer_id, &number).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}
