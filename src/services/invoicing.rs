//! Invoice request workflow: customers request, back office approves or
//! rejects.
//!
//! Approval is the only place invoice numbers are drawn and documents are
//! written, and both happen inside the approval transaction so a failed
//! approval leaves no half-issued invoice.

use crate::{
    db::DbPool,
    entities::{
        invoice_request::{self, Entity as InvoiceRequest, InvoiceRequestStatus},
        payment_record::{self, Entity as PaymentRecord, PaymentRecordStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{NewNotification, NotificationService},
    services::{
        documents::{BillingDetails, DocumentService, InvoiceLine},
        sequences::SequenceService,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const NIP_WEIGHTS: [u32; 9] = [6, 5, 7, 2, 3, 4, 5, 6, 7];

/// Strips separators commonly typed into NIPs.
pub fn normalize_nip(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}

/// Weighted checksum over a 10-digit NIP.
///
/// The first nine digits are weighted and summed; the sum modulo 11 must
/// equal the tenth digit. A remainder of 10 can never match, so such numbers
/// are invalid by construction.
pub fn nip_checksum_valid(nip: &str) -> bool {
    if nip.len() != 10 || !nip.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = nip.chars().filter_map(|c| c.to_digit(10)).collect();
    let sum: u32 = digits[..9]
        .iter()
        .zip(NIP_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    let checksum = sum % 11;
    checksum != 10 && checksum == digits[9]
}

/// Input for requesting an invoice over settled payment records.
#[derive(Debug, Clone)]
pub struct RequestInvoice {
    pub customer_id: Uuid,
    pub payment_ids: Vec<Uuid>,
    pub buyer_name: String,
    pub buyer_address: String,
    pub buyer_postal_code: String,
    pub buyer_city: String,
    pub buyer_nip: Option<String>,
    pub company: bool,
}

/// Admin decision over a pending request.
#[derive(Debug, Clone)]
pub enum ProcessDecision {
    Approve,
    Reject { comment: String },
}

/// Invoice request review service.
pub struct InvoicingService {
    db: Arc<DbPool>,
    documents: Arc<DocumentService>,
    sequences: Arc<SequenceService>,
    notifications: Arc<dyn NotificationService>,
    event_sender: Arc<EventSender>,
}

impl InvoicingService {
    pub fn new(
        db: Arc<DbPool>,
        documents: Arc<DocumentService>,
        sequences: Arc<SequenceService>,
        notifications: Arc<dyn NotificationService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            documents,
            sequences,
            notifications,
            event_sender,
        }
    }

    /// Creates a pending invoice request over the given payment records.
    ///
    /// A missing NIP is accepted here even for company buyers; approval is
    /// where the company rule bites.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn request_invoice(
        &self,
        input: RequestInvoice,
    ) -> Result<invoice_request::Model, ServiceError> {
        for (value, field) in [
            (&input.buyer_name, "buyer_name"),
            (&input.buyer_address, "buyer_address"),
            (&input.buyer_postal_code, "buyer_postal_code"),
            (&input.buyer_city, "buyer_city"),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        let nip = match &input.buyer_nip {
            Some(raw) if !raw.trim().is_empty() => {
                let normalized = normalize_nip(raw);
                if !nip_checksum_valid(&normalized) {
                    return Err(ServiceError::ValidationError(format!(
                        "NIP {} fails the checksum",
                        raw
                    )));
                }
                Some(normalized)
            }
            _ => None,
        };

        if input.payment_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "An invoice request needs at least one payment record".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in &input.payment_ids {
            if !seen.insert(*id) {
                return Err(ServiceError::ValidationError(format!(
                    "Payment record {} listed twice",
                    id
                )));
            }
        }

        let records = PaymentRecord::find()
            .filter(payment_record::Column::Id.is_in(input.payment_ids.iter().copied()))
            .all(&*self.db)
            .await?;
        if records.len() != input.payment_ids.len() {
            return Err(ServiceError::NotFound(
                "One or more payment records do not exist".to_string(),
            ));
        }
        for record in &records {
            if record.customer_id != input.customer_id {
                return Err(ServiceError::ValidationError(format!(
                    "Payment record {} belongs to another customer",
                    record.id
                )));
            }
            if record.status != PaymentRecordStatus::Completed {
                return Err(ServiceError::ValidationError(format!(
                    "Payment record {} is not settled",
                    record.id
                )));
            }
            if record.invoiced || record.invoice_request_id.is_some() {
                return Err(ServiceError::ValidationError(format!(
                    "Payment record {} is already invoiced",
                    record.id
                )));
            }
        }

        let claimed = self.records_claimed_elsewhere(input.customer_id).await?;
        for id in &input.payment_ids {
            if claimed.contains(id) {
                return Err(ServiceError::ValidationError(format!(
                    "Payment record {} is already part of another invoice request",
                    id
                )));
            }
        }

        let total: Decimal = records.iter().map(|r| r.final_amount).sum();
        let request_id = Uuid::new_v4();

        let model = invoice_request::ActiveModel {
            id: Set(request_id),
            customer_id: Set(input.customer_id),
            status: Set(InvoiceRequestStatus::Pending),
            buyer_name: Set(input.buyer_name.trim().to_string()),
            buyer_address: Set(input.buyer_address.trim().to_string()),
            buyer_postal_code: Set(input.buyer_postal_code.trim().to_string()),
            buyer_city: Set(input.buyer_city.trim().to_string()),
            buyer_nip: Set(nip),
            company: Set(input.company),
            payment_ids: Set(serde_json::json!(input.payment_ids)),
            total: Set(total),
            invoice_number: Set(None),
            document_path: Set(None),
            comment: Set(None),
            created_at: Set(Utc::now()),
            processed_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        let _ = self
            .event_sender
            .send(Event::InvoiceRequested {
                request_id,
                customer_id: input.customer_id,
            })
            .await;

        info!(
            "Invoice request {} created over {} records, total {}",
            request_id,
            input.payment_ids.len(),
            total
        );
        Ok(model)
    }

    /// Applies an admin decision to a pending request.
    #[instrument(skip(self, decision))]
    pub async fn process(
        &self,
        request_id: Uuid,
        decision: ProcessDecision,
    ) -> Result<invoice_request::Model, ServiceError> {
        match decision {
            ProcessDecision::Approve => self.approve(request_id).await,
            ProcessDecision::Reject { comment } => self.reject(request_id, &comment).await,
        }
    }

    async fn approve(&self, request_id: Uuid) -> Result<invoice_request::Model, ServiceError> {
        let request = self.find_request(request_id).await?;

        match request.status {
            InvoiceRequestStatus::Pending => {}
            InvoiceRequestStatus::Processed
                if request.invoice_number.is_some() && request.document_path.is_some() =>
            {
                // Re-delivered approval of an already issued invoice.
                return Ok(request);
            }
            other => {
                return Err(ServiceError::InvalidTransition(format!(
                    "invoice request {} is {}",
                    request_id, other
                )))
            }
        }

        if request.company {
            let valid = request
                .buyer_nip
                .as_deref()
                .map(nip_checksum_valid)
                .unwrap_or(false);
            if !valid {
                return Err(ServiceError::ValidationError(
                    "Company invoice approval requires a valid NIP".to_string(),
                ));
            }
        }

        let payment_ids: Vec<Uuid> = serde_json::from_value(request.payment_ids.clone())
            .map_err(|e| {
                ServiceError::SerializationError(format!(
                    "invoice request {} has malformed payment ids: {}",
                    request_id, e
                ))
            })?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let allocated = self.sequences.reserve(&txn).await?;

        let records = PaymentRecord::find()
            .filter(payment_record::Column::Id.is_in(payment_ids.iter().copied()))
            .order_by_asc(payment_record::Column::CreatedAt)
            .all(&txn)
            .await?;
        let lines: Vec<InvoiceLine> = records
            .iter()
            .map(|r| InvoiceLine {
                title: r.course_title.clone(),
                gross: Some(r.final_amount),
            })
            .collect();
        let billing = BillingDetails {
            name: request.buyer_name.clone(),
            address: request.buyer_address.clone(),
            postal_code: request.buyer_postal_code.clone(),
            city: request.buyer_city.clone(),
            nip: request.buyer_nip.clone(),
        };

        let content = self.documents.render(
            &allocated.number,
            now.date_naive(),
            &billing,
            &lines,
            request.total,
        );
        let document_path = self
            .documents
            .store(request.customer_id, &allocated.number, &content)
            .await?;

        let marked = PaymentRecord::update_many()
            .col_expr(payment_record::Column::Invoiced, Expr::value(true))
            .col_expr(
                payment_record::Column::InvoiceRequestId,
                Expr::value(request_id),
            )
            .filter(payment_record::Column::Id.is_in(payment_ids.iter().copied()))
            .filter(payment_record::Column::Invoiced.eq(false))
            .exec(&txn)
            .await?;
        if marked.rows_affected != payment_ids.len() as u64 {
            return Err(ServiceError::InvalidTransition(format!(
                "payment records of request {} were invoiced concurrently",
                request_id
            )));
        }

        let flipped = InvoiceRequest::update_many()
            .col_expr(
                invoice_request::Column::Status,
                Expr::value(InvoiceRequestStatus::Processed),
            )
            .col_expr(
                invoice_request::Column::InvoiceNumber,
                Expr::value(allocated.number.clone()),
            )
            .col_expr(
                invoice_request::Column::DocumentPath,
                Expr::value(document_path.clone()),
            )
            .col_expr(
                invoice_request::Column::ProcessedAt,
                Expr::value(Some(now)),
            )
            .filter(invoice_request::Column::Id.eq(request_id))
            .filter(invoice_request::Column::Status.eq(InvoiceRequestStatus::Pending))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            drop(txn);
            let current = self.find_request(request_id).await?;
            if current.status == InvoiceRequestStatus::Processed
                && current.invoice_number.is_some()
            {
                return Ok(current);
            }
            return Err(ServiceError::InvalidTransition(format!(
                "invoice request {} is {}",
                request_id, current.status
            )));
        }

        if let Err(e) = self
            .notifications
            .queue_in(
                &txn,
                NewNotification::invoice_processed(request.customer_id, &allocated.number),
            )
            .await
        {
            warn!(
                "Failed to queue invoice notification for request {}: {}",
                request_id, e
            );
        }

        txn.commit().await?;

        let _ = self
            .event_sender
            .send(Event::InvoiceProcessed {
                request_id,
                invoice_number: allocated.number.clone(),
            })
            .await;

        info!(
            "Invoice request {} approved as {}",
            request_id, allocated.number
        );
        self.find_request(request_id).await
    }

    async fn reject(
        &self,
        request_id: Uuid,
        comment: &str,
    ) -> Result<invoice_request::Model, ServiceError> {
        if comment.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Rejecting an invoice request requires a comment".to_string(),
            ));
        }

        let request = self.find_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "invoice request {} is {}",
                request_id, request.status
            )));
        }

        let res = InvoiceRequest::update_many()
            .col_expr(
                invoice_request::Column::Status,
                Expr::value(InvoiceRequestStatus::Rejected),
            )
            .col_expr(
                invoice_request::Column::Comment,
                Expr::value(comment.trim().to_string()),
            )
            .col_expr(
                invoice_request::Column::ProcessedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(invoice_request::Column::Id.eq(request_id))
            .filter(invoice_request::Column::Status.eq(InvoiceRequestStatus::Pending))
            .exec(&*self.db)
            .await?;
        if res.rows_affected == 0 {
            let current = self.find_request(request_id).await?;
            return Err(ServiceError::InvalidTransition(format!(
                "invoice request {} is {}",
                request_id, current.status
            )));
        }

        if let Err(e) = self
            .notifications
            .queue(NewNotification::invoice_rejected(
                request.customer_id,
                request_id,
                comment.trim(),
            ))
            .await
        {
            warn!(
                "Failed to queue rejection notification for request {}: {}",
                request_id, e
            );
        }

        let _ = self
            .event_sender
            .send(Event::InvoiceRejected {
                request_id,
                reason: Some(comment.trim().to_string()),
            })
            .await;

        info!("Invoice request {} rejected", request_id);
        self.find_request(request_id).await
    }

    /// Request by id.
    pub async fn get_request(
        &self,
        request_id: Uuid,
    ) -> Result<invoice_request::Model, ServiceError> {
        self.find_request(request_id).await
    }

    /// A customer's requests, newest first.
    pub async fn list_customer_requests(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<invoice_request::Model>, u64), ServiceError> {
        let paginator = InvoiceRequest::find()
            .filter(invoice_request::Column::CustomerId.eq(customer_id))
            .order_by_desc(invoice_request::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// The review queue: pending requests, oldest first.
    pub async fn pending_queue(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<invoice_request::Model>, u64), ServiceError> {
        let paginator = InvoiceRequest::find()
            .filter(invoice_request::Column::Status.eq(InvoiceRequestStatus::Pending))
            .order_by_asc(invoice_request::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    async fn find_request(
        &self,
        request_id: Uuid,
    ) -> Result<invoice_request::Model, ServiceError> {
        InvoiceRequest::find_by_id(request_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Invoice request {} not found", request_id))
            })
    }

    /// Record ids held by the customer's pending or processed requests.
    ///
    /// Pending requests have not stamped their records yet, so the overlap
    /// check has to read the request side.
    async fn records_claimed_elsewhere(
        &self,
        customer_id: Uuid,
    ) -> Result<HashSet<Uuid>, ServiceError> {
        let open = InvoiceRequest::find()
            .filter(invoice_request::Column::CustomerId.eq(customer_id))
            .filter(invoice_request::Column::Status.ne(InvoiceRequestStatus::Rejected))
            .all(&*self.db)
            .await?;

        let mut claimed = HashSet::new();
        for request in open {
            let ids: Vec<Uuid> =
                serde_json::from_value(request.payment_ids.clone()).unwrap_or_default();
            claimed.extend(ids);
        }
        Ok(claimed)
    }
}
