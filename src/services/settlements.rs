//! Checkout and settlement orchestration.
//!
//! One code path handles carts of any size; a single-course purchase is a
//! one-item cart. The transaction status machine (`New -> Registered ->
//! Completed`, failures from the two non-terminal states) is enforced twice:
//! in `TransactionStatus::can_transition_to` for early rejection and by
//! status-guarded conditional updates for correctness under concurrency.

use crate::{
    common::{round2, to_minor_units},
    db::DbPool,
    entities::{
        customer::Entity as Customer,
        entitlement,
        payment_record::{self, Entity as PaymentRecord, PaymentRecordStatus},
        transaction::{self, Entity as Transaction, TransactionStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{NewNotification, NotificationService},
    services::{
        discounts::{allocate_shares, DiscountService},
        gateway::{self, OrderSigner, PaymentGateway, PaymentNotification, RegisterOrder},
        referrals::ReferralService,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// One cart line at checkout.
#[derive(Debug, Clone)]
pub struct CheckoutItem {
    pub course_id: Uuid,
    pub title: String,
    pub amount: Decimal,
}

/// Input for starting a checkout.
#[derive(Debug, Clone)]
pub struct StartCheckout {
    pub customer_id: Uuid,
    pub items: Vec<CheckoutItem>,
    pub discount_code: Option<String>,
}

/// Result of a started checkout: where to send the customer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartedCheckout {
    pub transaction_id: Uuid,
    pub redirect_url: String,
    pub original_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
}

/// Transaction plus its per-course payment records.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub transaction: transaction::Model,
    pub records: Vec<payment_record::Model>,
}

/// How a settlement callback was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Settled(Uuid),
    AlreadySettled(Uuid),
}

fn describe_items(items: &[CheckoutItem]) -> String {
    match items {
        [] => String::new(),
        [only] => only.title.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first.title, rest.len()),
    }
}

/// Order settlement orchestrator.
pub struct SettlementService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    discounts: Arc<DiscountService>,
    referrals: Arc<ReferralService>,
    gateway: Arc<dyn PaymentGateway>,
    signer: Arc<dyn OrderSigner>,
    notifications: Arc<dyn NotificationService>,
    currency: String,
    allow_simulated: bool,
}

impl SettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        discounts: Arc<DiscountService>,
        referrals: Arc<ReferralService>,
        gateway: Arc<dyn PaymentGateway>,
        signer: Arc<dyn OrderSigner>,
        notifications: Arc<dyn NotificationService>,
        currency: String,
        allow_simulated: bool,
    ) -> Self {
        Self {
            db,
            event_sender,
            discounts,
            referrals,
            gateway,
            signer,
            notifications,
            currency,
            allow_simulated,
        }
    }

    /// Starts a checkout: persists the transaction and its records, consumes
    /// the discount, registers the order at the gateway and returns the
    /// redirect.
    ///
    /// The gateway call happens after the write transaction commits. A
    /// failed registration marks the transaction `Failed`; the consumed
    /// discount use stays on the books with it.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn start_checkout(
        &self,
        input: StartCheckout,
    ) -> Result<StartedCheckout, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Checkout requires at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.amount < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Item {} has a negative amount",
                    item.course_id
                )));
            }
            if item.title.trim().is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "Item {} has an empty title",
                    item.course_id
                )));
            }
        }

        let customer = Customer::find_by_id(input.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", input.customer_id))
            })?;

        let discount = match &input.discount_code {
            Some(code) => Some(self.discounts.validate_code(code).await?),
            None => None,
        };
        let percent = discount.as_ref().map(|d| d.percent).unwrap_or(Decimal::ZERO);

        let amounts: Vec<Decimal> = input.items.iter().map(|i| round2(i.amount)).collect();
        let breakdown = allocate_shares(&amounts, percent);

        let transaction_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;

        transaction::ActiveModel {
            id: Set(transaction_id),
            customer_id: Set(customer.id),
            gateway_order_id: Set(None),
            status: Set(TransactionStatus::New),
            original_total: Set(breakdown.original_total),
            discount_total: Set(breakdown.discount_total),
            total: Set(breakdown.discounted_total),
            currency: Set(self.currency.clone()),
            discount_code_id: Set(discount.as_ref().map(|d| d.id)),
            payment_method: Set(None),
            gateway_metadata: Set(None),
            created_at: Set(now),
            completed_at: Set(None),
        }
        .insert(&txn)
        .await?;

        for ((item, amount), share) in input
            .items
            .iter()
            .zip(&amounts)
            .zip(&breakdown.shares)
        {
            payment_record::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(transaction_id),
                customer_id: Set(customer.id),
                course_id: Set(item.course_id),
                course_title: Set(item.title.clone()),
                amount: Set(*amount),
                discount_share: Set(*share),
                final_amount: Set(*amount - *share),
                status: Set(PaymentRecordStatus::Pending),
                invoiced: Set(false),
                invoice_request_id: Set(None),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        if let Some(d) = &discount {
            self.discounts.consume(&txn, d).await?;
        }

        txn.commit().await?;

        if let Some(d) = &discount {
            let _ = self
                .event_sender
                .send(Event::DiscountConsumed {
                    code: d.code.clone(),
                    transaction_id,
                })
                .await;
        }

        let order = RegisterOrder {
            session_id: transaction_id,
            amount: to_minor_units(breakdown.discounted_total)?,
            currency: self.currency.clone(),
            description: describe_items(&input.items),
            email: customer.email.clone(),
        };

        match self.gateway.register_order(&order).await {
            Ok(redirect) => {
                self.transition(
                    transaction_id,
                    TransactionStatus::New,
                    TransactionStatus::Registered,
                    Some(redirect.gateway_order_id.clone()),
                )
                .await?;

                let _ = self
                    .event_sender
                    .send(Event::CheckoutStarted {
                        transaction_id,
                        customer_id: customer.id,
                    })
                    .await;

                info!(
                    "Checkout started: transaction {} total {} {}",
                    transaction_id, breakdown.discounted_total, self.currency
                );

                Ok(StartedCheckout {
                    transaction_id,
                    redirect_url: redirect.redirect_url,
                    original_total: breakdown.original_total,
                    discount_total: breakdown.discount_total,
                    total: breakdown.discounted_total,
                })
            }
            Err(e) => {
                warn!(
                    "Gateway registration failed for transaction {}: {}",
                    transaction_id, e
                );
                if let Err(fail_err) = self
                    .fail_settlement(transaction_id, "gateway registration failed")
                    .await
                {
                    error!(
                        "Could not mark transaction {} failed: {}",
                        transaction_id, fail_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Handles a signed gateway callback.
    ///
    /// Signature first, then amount/currency against the stored total, then
    /// the settlement itself. Re-delivery of an already settled transaction
    /// is acknowledged without side effects.
    #[instrument(skip(self, notification), fields(session_id = %notification.session_id))]
    pub async fn confirm_settlement(
        &self,
        notification: &PaymentNotification,
    ) -> Result<SettlementOutcome, ServiceError> {
        gateway::verify_callback(self.signer.as_ref(), notification)?;

        let transaction_id = Uuid::parse_str(&notification.session_id).map_err(|_| {
            ServiceError::ValidationError(format!(
                "Invalid session id {}",
                notification.session_id
            ))
        })?;

        let tx = Transaction::find_by_id(transaction_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
            })?;

        let expected = to_minor_units(tx.total)?;
        if notification.amount != expected || notification.currency != tx.currency {
            return Err(ServiceError::ValidationError(format!(
                "Callback amount {} {} does not match transaction total {} {}",
                notification.amount, notification.currency, expected, tx.currency
            )));
        }

        if tx.status == TransactionStatus::Completed {
            info!(
                "Transaction {} already settled, acknowledging re-delivery",
                transaction_id
            );
            return Ok(SettlementOutcome::AlreadySettled(transaction_id));
        }
        if !tx.status.can_transition_to(TransactionStatus::Completed) {
            return Err(ServiceError::InvalidTransition(format!(
                "transaction {} is {}",
                transaction_id, tx.status
            )));
        }

        let metadata = serde_json::json!({
            "order_id": notification.order_id,
            "method_id": notification.method_id,
            "statement": notification.statement,
        });

        if self.settle(transaction_id, tx.customer_id, Some(metadata)).await? {
            Ok(SettlementOutcome::Settled(transaction_id))
        } else {
            Ok(SettlementOutcome::AlreadySettled(transaction_id))
        }
    }

    /// Settles a registered transaction without gateway verification.
    ///
    /// Only available when `allow_simulated_settlement` is on; refused in
    /// production configurations.
    #[instrument(skip(self))]
    pub async fn simulate_settlement(&self, transaction_id: Uuid) -> Result<(), ServiceError> {
        if !self.allow_simulated {
            return Err(ServiceError::ValidationError(
                "Simulated settlement is disabled".to_string(),
            ));
        }

        let tx = Transaction::find_by_id(transaction_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
            })?;

        match tx.status {
            TransactionStatus::Completed => {
                return Err(ServiceError::AlreadySettled(transaction_id))
            }
            TransactionStatus::Failed => {
                return Err(ServiceError::InvalidTransition(format!(
                    "transaction {} already failed",
                    transaction_id
                )))
            }
            _ => {}
        }

        if self.settle(transaction_id, tx.customer_id, None).await? {
            Ok(())
        } else {
            Err(ServiceError::AlreadySettled(transaction_id))
        }
    }

    /// Marks a settlement failed after a gateway-reported failure.
    ///
    /// Repeating the failure report for an already failed transaction is a
    /// no-op.
    #[instrument(skip(self))]
    pub async fn fail_settlement(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let res = Transaction::update_many()
            .col_expr(
                transaction::Column::Status,
                Expr::value(TransactionStatus::Failed),
            )
            .filter(transaction::Column::Id.eq(transaction_id))
            .filter(transaction::Column::Status.is_in([
                TransactionStatus::New,
                TransactionStatus::Registered,
            ]))
            .exec(&txn)
            .await?;

        if res.rows_affected == 0 {
            drop(txn);
            let current = Transaction::find_by_id(transaction_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
                })?;
            return match current.status {
                TransactionStatus::Failed => Ok(()),
                TransactionStatus::Completed => {
                    Err(ServiceError::AlreadySettled(transaction_id))
                }
                other => Err(ServiceError::InvalidTransition(format!(
                    "transaction {} is {}",
                    transaction_id, other
                ))),
            };
        }

        PaymentRecord::update_many()
            .col_expr(
                payment_record::Column::Status,
                Expr::value(PaymentRecordStatus::Failed),
            )
            .filter(payment_record::Column::TransactionId.eq(transaction_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        let _ = self
            .event_sender
            .send(Event::SettlementFailed {
                transaction_id,
                reason: reason.to_string(),
            })
            .await;

        info!("Transaction {} marked failed: {}", transaction_id, reason);
        Ok(())
    }

    /// Transaction with its payment records.
    pub async fn get_transaction(&self, id: Uuid) -> Result<TransactionDetails, ServiceError> {
        let tx = Transaction::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;

        let records = PaymentRecord::find()
            .filter(payment_record::Column::TransactionId.eq(id))
            .order_by_asc(payment_record::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(TransactionDetails {
            transaction: tx,
            records,
        })
    }

    /// A customer's transactions, newest first.
    pub async fn list_customer_transactions(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<transaction::Model>, u64), ServiceError> {
        let paginator = Transaction::find()
            .filter(transaction::Column::CustomerId.eq(customer_id))
            .order_by_desc(transaction::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// The settlement write transaction shared by callback and simulation.
    ///
    /// Returns `Ok(true)` when this call performed the settlement and
    /// `Ok(false)` when a concurrent caller already completed it. All other
    /// states surface `InvalidTransition`.
    async fn settle(
        &self,
        transaction_id: Uuid,
        customer_id: Uuid,
        gateway_metadata: Option<serde_json::Value>,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut update = Transaction::update_many()
            .col_expr(
                transaction::Column::Status,
                Expr::value(TransactionStatus::Completed),
            )
            .col_expr(transaction::Column::CompletedAt, Expr::value(Some(now)));
        if let Some(meta) = gateway_metadata {
            update = update.col_expr(transaction::Column::GatewayMetadata, Expr::value(meta));
        }

        let res = update
            .filter(transaction::Column::Id.eq(transaction_id))
            .filter(transaction::Column::Status.eq(TransactionStatus::Registered))
            .exec(&txn)
            .await?;

        if res.rows_affected == 0 {
            drop(txn);
            let current = Transaction::find_by_id(transaction_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Transaction {} not found", transaction_id))
                })?;
            if current.status == TransactionStatus::Completed {
                return Ok(false);
            }
            return Err(ServiceError::InvalidTransition(format!(
                "transaction {} is {}",
                transaction_id, current.status
            )));
        }

        PaymentRecord::update_many()
            .col_expr(
                payment_record::Column::Status,
                Expr::value(PaymentRecordStatus::Completed),
            )
            .filter(payment_record::Column::TransactionId.eq(transaction_id))
            .exec(&txn)
            .await?;

        let records = PaymentRecord::find()
            .filter(payment_record::Column::TransactionId.eq(transaction_id))
            .all(&txn)
            .await?;

        let mut course_ids = Vec::new();
        for record in &records {
            let granted = entitlement::Entity::insert(entitlement::ActiveModel {
                id: Set(Uuid::new_v4()),
                customer_id: Set(customer_id),
                course_id: Set(record.course_id),
                transaction_id: Set(transaction_id),
                granted_at: Set(now),
            })
            .on_conflict(
                OnConflict::columns([
                    entitlement::Column::CustomerId,
                    entitlement::Column::CourseId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

            if granted > 0 {
                course_ids.push(record.course_id);
            }
        }

        let completed_count = Transaction::find()
            .filter(transaction::Column::CustomerId.eq(customer_id))
            .filter(transaction::Column::Status.eq(TransactionStatus::Completed))
            .count(&txn)
            .await?;
        let credited = if completed_count == 1 {
            self.referrals.credit_referrer(&txn, customer_id).await?
        } else {
            None
        };

        let total: Decimal = records.iter().map(|r| r.final_amount).sum();
        if let Err(e) = self
            .notifications
            .queue_in(
                &txn,
                NewNotification::settlement_completed(
                    customer_id,
                    transaction_id,
                    total,
                    &self.currency,
                ),
            )
            .await
        {
            warn!(
                "Failed to queue settlement notification for {}: {}",
                transaction_id, e
            );
        }

        txn.commit().await?;

        let _ = self
            .event_sender
            .send(Event::SettlementCompleted {
                transaction_id,
                customer_id,
                completed_at: now,
            })
            .await;
        if !course_ids.is_empty() {
            let _ = self
                .event_sender
                .send(Event::EntitlementsGranted {
                    customer_id,
                    transaction_id,
                    course_ids,
                })
                .await;
        }
        if let Some(referrer_id) = credited {
            let _ = self
                .event_sender
                .send(Event::ReferralCredited {
                    referrer_id,
                    referred_id: customer_id,
                })
                .await;
        }

        info!("Transaction {} settled", transaction_id);
        Ok(true)
    }

    /// Status-guarded transition on the transaction row.
    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        gateway_order_id: Option<String>,
    ) -> Result<(), ServiceError> {
        if !from.can_transition_to(to) {
            return Err(ServiceError::InvalidTransition(format!(
                "{} -> {}",
                from, to
            )));
        }

        let mut update = Transaction::update_many()
            .col_expr(transaction::Column::Status, Expr::value(to));
        if let Some(token) = gateway_order_id {
            update = update.col_expr(transaction::Column::GatewayOrderId, Expr::value(token));
        }

        let res = update
            .filter(transaction::Column::Id.eq(id))
            .filter(transaction::Column::Status.eq(from))
            .exec(&*self.db)
            .await?;

        if res.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(format!(
                "transaction {} is no longer {}",
                id, from
            )));
        }

        Ok(())
    }
}
