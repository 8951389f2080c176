use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::notification;
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<notification::Model> for NotificationResponse {
    fn from(m: notification::Model) -> Self {
        Self {
            id: m.id,
            kind: m.kind.to_string(),
            subject: m.subject,
            body: m.body,
            is_read: m.is_read,
            created_at: m.created_at,
        }
    }
}

/// A customer's notification inbox
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/notifications",
    summary = "Notification inbox",
    params(
        ("id" = Uuid, Path, description = "Customer id"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Inbox retrieved", body = ApiResponse<PaginatedResponse<NotificationResponse>>),
    )
)]
pub async fn notification_inbox(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<NotificationResponse>>>, ServiceError> {
    let limit = query.limit.min(state.config.api_max_page_size as u64).max(1);
    let (items, total) = state
        .services
        .notifications
        .inbox(id, query.page, limit)
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

/// Mark a notification as read
#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    summary = "Mark notification read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = ApiResponse<String>),
        (status = 404, description = "Notification not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<String>>, ServiceError> {
    state.services.notifications.mark_read(id).await?;
    Ok(Json(ApiResponse::success("read".to_string())))
}
