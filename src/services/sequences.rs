use crate::{
    db::DbPool,
    entities::{
        invoice_request::{self, Entity as InvoiceRequest},
        invoice_sequence::{self, Entity as InvoiceSequence},
    },
    errors::ServiceError,
};
use chrono::{Datelike, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// How many compare-and-swap rounds to attempt before giving up.
const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

/// An invoice number allocated from the yearly sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedNumber {
    pub year: i32,
    pub ordinal: i32,
    pub number: String,
}

/// Formats an invoice number as `PREFIX/YYYY/MM/NNNNN`.
///
/// The year is the sequence year the ordinal was drawn from; the month is
/// the issue month, which may lag the sequence year around New Year's Eve.
pub fn format_invoice_number(prefix: &str, year: i32, month: u32, ordinal: i32) -> String {
    format!("{}/{:04}/{:02}/{:05}", prefix, year, month, ordinal)
}

/// Yearly invoice numbering backed by a single counter row.
///
/// The counter row carries `(year, current_ordinal)` and both columns act as
/// the compare-and-swap predicate: an update only lands if nobody else moved
/// the counter since we read it. On a year change the row is rewritten to
/// `(new_year, 1)` under the same predicate, so the first number of January
/// is always 00001.
#[derive(Clone)]
pub struct SequenceService {
    db: Arc<DbPool>,
    series_prefix: String,
}

impl SequenceService {
    pub fn new(db: Arc<DbPool>, series_prefix: String) -> Self {
        Self { db, series_prefix }
    }

    /// Allocates the next invoice number using the service's own pool.
    pub async fn next_number(&self) -> Result<AllocatedNumber, ServiceError> {
        self.next_number_on(&*self.db).await
    }

    /// Allocates the next invoice number on the given connection.
    ///
    /// Runs inside the caller's transaction when handed one, so a rolled
    /// back invoice leaves a gap in the series rather than a misnumbered
    /// document.
    #[instrument(skip(self, conn))]
    pub async fn next_number_on<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<AllocatedNumber, ServiceError> {
        self.ensure_row(conn).await?;

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let row = InvoiceSequence::find_by_id(1)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("invoice sequence row missing".to_string())
                })?;

            let now = Utc::now();
            let target_year = now.year();
            let next_ordinal = if row.year == target_year {
                row.current_ordinal + 1
            } else {
                1
            };

            let res = InvoiceSequence::update_many()
                .col_expr(invoice_sequence::Column::Year, Expr::value(target_year))
                .col_expr(
                    invoice_sequence::Column::CurrentOrdinal,
                    Expr::value(next_ordinal),
                )
                .filter(invoice_sequence::Column::Id.eq(1))
                .filter(invoice_sequence::Column::Year.eq(row.year))
                .filter(invoice_sequence::Column::CurrentOrdinal.eq(row.current_ordinal))
                .exec(conn)
                .await?;

            if res.rows_affected == 1 {
                let number = format_invoice_number(
                    &self.series_prefix,
                    target_year,
                    now.month(),
                    next_ordinal,
                );
                debug!("Allocated invoice number {}", number);
                counter!("edupay_sequences.numbers_allocated", 1);
                return Ok(AllocatedNumber {
                    year: target_year,
                    ordinal: next_ordinal,
                    number,
                });
            }

            counter!("edupay_sequences.cas_conflicts", 1);
            warn!(
                "Invoice sequence CAS lost (attempt {}/{})",
                attempt, MAX_ALLOCATION_ATTEMPTS
            );
            tokio::time::sleep(Duration::from_millis(10 * attempt as u64)).await;
        }

        Err(ServiceError::NumberCollision(format!(
            "could not allocate an invoice number after {} attempts",
            MAX_ALLOCATION_ATTEMPTS
        )))
    }

    /// Allocates a number and verifies no issued invoice already carries it.
    ///
    /// The counter is the source of truth, so a hit here means the counter
    /// was reset or edited underneath an issued series; surfacing the
    /// collision beats silently issuing a duplicate number.
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<AllocatedNumber, ServiceError> {
        let allocated = self.next_number_on(conn).await?;

        let taken = InvoiceRequest::find()
            .filter(invoice_request::Column::InvoiceNumber.eq(allocated.number.as_str()))
            .count(conn)
            .await?;
        if taken > 0 {
            return Err(ServiceError::NumberCollision(allocated.number));
        }

        Ok(allocated)
    }

    /// Seeds the counter row if it does not exist yet.
    async fn ensure_row<C: ConnectionTrait>(&self, conn: &C) -> Result<(), ServiceError> {
        let seed = invoice_sequence::ActiveModel {
            id: Set(1),
            year: Set(Utc::now().year()),
            current_ordinal: Set(0),
        };

        InvoiceSequence::insert(seed)
            .on_conflict(
                OnConflict::column(invoice_sequence::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok(())
    }
}
