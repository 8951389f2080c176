//! EduPay API Library
//!
//! This crate provides the core functionality for the EduPay settlement API
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod request_id;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn customer_service(&self) -> Arc<services::customers::CustomerService> {
        self.services.customers.clone()
    }

    pub fn discount_service(&self) -> Arc<services::discounts::DiscountService> {
        self.services.discounts.clone()
    }

    pub fn settlement_service(&self) -> Arc<services::settlements::SettlementService> {
        self.services.settlements.clone()
    }

    pub fn invoicing_service(&self) -> Arc<services::invoicing::InvoicingService> {
        self.services.invoicing.clone()
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: request_id::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response = crate::request_id::scope_request_id(
            crate::request_id::RequestId::new("meta-123"),
            async { ApiResponse::success("ok") },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response = crate::request_id::scope_request_id(
            crate::request_id::RequestId::new("meta-err"),
            async { ApiResponse::<()>::error("oops".into()) },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }

    #[tokio::test]
    async fn validation_errors_response_includes_metadata() {
        let response = crate::request_id::scope_request_id(
            crate::request_id::RequestId::new("meta-validation"),
            async { ApiResponse::<()>::validation_errors(vec!["missing".into()]) },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-validation"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// Full v1 API surface
pub fn api_v1_routes() -> Router<AppState> {
    // Checkout and settlement routes
    let checkout = Router::new()
        .route("/checkout", post(handlers::checkout::start_checkout))
        .route(
            "/checkout/callback",
            post(handlers::checkout::gateway_callback),
        )
        .route(
            "/checkout/simulate",
            post(handlers::checkout::simulate_settlement),
        )
        .route("/transactions/:id", get(handlers::checkout::get_transaction));

    // Customer routes and the per-customer listings hanging off them
    let customers = Router::new()
        .route(
            "/customers",
            post(handlers::customers::register_customer),
        )
        .route(
            "/customers/:id/transactions",
            get(handlers::checkout::list_customer_transactions),
        )
        .route(
            "/customers/:id/referrals",
            get(handlers::customers::referral_summary),
        )
        .route(
            "/customers/:id/entitlements",
            get(handlers::customers::list_entitlements),
        )
        .route(
            "/customers/:id/invoices",
            get(handlers::invoices::list_customer_invoices),
        )
        .route(
            "/customers/:id/notifications",
            get(handlers::notifications::notification_inbox),
        );

    // Discount code routes
    let discounts = Router::new()
        .route("/discounts", post(handlers::discounts::create_discount))
        .route(
            "/discounts/:code/preview",
            get(handlers::discounts::preview_discount),
        );

    // Invoice request workflow and document downloads. Invoice numbers
    // contain slashes, so the document route takes a wildcard tail.
    let invoices = Router::new()
        .route(
            "/invoices/requests",
            post(handlers::invoices::request_invoice),
        )
        .route(
            "/invoices/requests/pending",
            get(handlers::invoices::pending_invoice_requests),
        )
        .route(
            "/invoices/requests/:id",
            get(handlers::invoices::get_invoice_request),
        )
        .route(
            "/invoices/requests/:id/process",
            post(handlers::invoices::process_invoice_request),
        )
        .route(
            "/invoices/documents/:customer_id/*number",
            get(handlers::invoices::download_invoice_document),
        );

    let notifications = Router::new().route(
        "/notifications/:id/read",
        post(handlers::notifications::mark_notification_read),
    );

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(checkout)
        .merge(customers)
        .merge(discounts)
        .merge(invoices)
        .merge(notifications)
}

async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "edupay-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check database connectivity
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
