//! Store-backed customer notifications (inbox model).
//!
//! Settlement and invoicing queue notifications best-effort: a failed queue
//! write is logged and swallowed by the caller, never failing the business
//! operation itself. When the caller passes its open transaction the queue
//! write commits or rolls back with it.

use crate::{
    db::DbPool,
    entities::notification::{self, Entity as Notification, NotificationKind},
    errors::ServiceError,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use slog::{info, Logger};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::error::DbErr),
    #[error("Notification not found: {0}")]
    NotFound(Uuid),
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Database(e) => ServiceError::DatabaseError(e),
            NotificationError::NotFound(id) => {
                ServiceError::NotFound(format!("Notification {} not found", id))
            }
        }
    }
}

/// A notification waiting to be queued.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub customer_id: Uuid,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    pub context: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn invoice_processed(customer_id: Uuid, invoice_number: &str) -> Self {
        Self {
            customer_id,
            kind: NotificationKind::InvoiceProcessed,
            subject: format!("Invoice {} issued", invoice_number),
            body: format!(
                "Your invoice {} has been issued and is ready for download.",
                invoice_number
            ),
            context: Some(serde_json::json!({ "invoice_number": invoice_number })),
        }
    }

    pub fn invoice_rejected(customer_id: Uuid, request_id: Uuid, comment: &str) -> Self {
        Self {
            customer_id,
            kind: NotificationKind::InvoiceRejected,
            subject: "Invoice request rejected".to_string(),
            body: format!("Your invoice request was rejected: {}", comment),
            context: Some(serde_json::json!({
                "request_id": request_id,
                "comment": comment,
            })),
        }
    }

    pub fn settlement_completed(
        customer_id: Uuid,
        transaction_id: Uuid,
        total: Decimal,
        currency: &str,
    ) -> Self {
        Self {
            customer_id,
            kind: NotificationKind::SettlementCompleted,
            subject: "Payment received".to_string(),
            body: format!(
                "Your payment of {} {} has been settled. Purchased courses are now available.",
                total, currency
            ),
            context: Some(serde_json::json!({
                "transaction_id": transaction_id,
                "total": total,
                "currency": currency,
            })),
        }
    }
}

/// Trait for notification service operations
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Queue a notification using the service's own pool.
    async fn queue(&self, new: NewNotification) -> Result<notification::Model, NotificationError>;

    /// Queue a notification inside the caller's open transaction.
    async fn queue_in(
        &self,
        txn: &DatabaseTransaction,
        new: NewNotification,
    ) -> Result<notification::Model, NotificationError>;

    /// Customer inbox, newest first.
    async fn inbox(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<notification::Model>, u64), NotificationError>;

    async fn mark_read(&self, notification_id: Uuid) -> Result<(), NotificationError>;
}

/// Database-backed notification service
#[derive(Clone)]
pub struct DbNotificationService {
    db: Arc<DbPool>,
    logger: Logger,
}

impl DbNotificationService {
    pub fn new(db: Arc<DbPool>, logger: Logger) -> Self {
        Self { db, logger }
    }

    fn active_model(new: NewNotification) -> notification::ActiveModel {
        notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(new.customer_id),
            kind: Set(new.kind),
            subject: Set(new.subject),
            body: Set(new.body),
            context: Set(new.context),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        }
    }
}

#[async_trait]
impl NotificationService for DbNotificationService {
    async fn queue(&self, new: NewNotification) -> Result<notification::Model, NotificationError> {
        let customer_id = new.customer_id;
        let model = Self::active_model(new).insert(&*self.db).await?;
        info!(self.logger, "Notification queued";
            "customer_id" => customer_id.to_string(),
            "kind" => model.kind.to_string(),
        );
        Ok(model)
    }

    async fn queue_in(
        &self,
        txn: &DatabaseTransaction,
        new: NewNotification,
    ) -> Result<notification::Model, NotificationError> {
        let customer_id = new.customer_id;
        let model = Self::active_model(new).insert(txn).await?;
        info!(self.logger, "Notification queued";
            "customer_id" => customer_id.to_string(),
            "kind" => model.kind.to_string(),
        );
        Ok(model)
    }

    async fn inbox(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<notification::Model>, u64), NotificationError> {
        let paginator = Notification::find()
            .filter(notification::Column::CustomerId.eq(customer_id))
            .order_by_desc(notification::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    async fn mark_read(&self, notification_id: Uuid) -> Result<(), NotificationError> {
        let found = Notification::find_by_id(notification_id)
            .one(&*self.db)
            .await?
            .ok_or(NotificationError::NotFound(notification_id))?;

        let mut update: notification::ActiveModel = found.into();
        update.is_read = Set(true);
        update.update(&*self.db).await?;
        Ok(())
    }
}
