//! Integration tests for yearly invoice number allocation.
//!
//! Tests cover:
//! - First allocation and consecutive ordinals
//! - Concurrent allocations never handing out the same ordinal
//! - Year rollover restarting the series at 00001
//! - Reservation refusing numbers already carried by an issued invoice

mod common;

use chrono::{Datelike, Utc};
use common::TestApp;
use edupay_api::entities::invoice_request::{self, InvoiceRequestStatus};
use edupay_api::entities::invoice_sequence;
use edupay_api::errors::ServiceError;
use edupay_api::services::sequences::SequenceService;
use regex::Regex;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

fn sequence_service(app: &TestApp) -> SequenceService {
    SequenceService::new(app.state.db.clone(), "FV".to_string())
}

#[tokio::test]
async fn test_first_allocation_starts_the_series() {
    let app = TestApp::new().await;
    let service = sequence_service(&app);

    let allocated = service.next_number().await.expect("allocation");
    assert_eq!(allocated.ordinal, 1);

    let pattern = Regex::new(r"^FV/\d{4}/\d{2}/00001$").unwrap();
    assert!(
        pattern.is_match(&allocated.number),
        "unexpected number {}",
        allocated.number
    );
    assert!(allocated
        .number
        .contains(&format!("/{:04}/", allocated.year)));
}

#[tokio::test]
async fn test_sequential_allocations_count_up() {
    let app = TestApp::new().await;
    let service = sequence_service(&app);

    for expected in 1..=3 {
        let allocated = service.next_number().await.expect("allocation");
        assert_eq!(allocated.ordinal, expected);
        assert!(allocated.number.ends_with(&format!("{:05}", expected)));
    }
}

#[tokio::test]
async fn allocation_is_unique_under_concurrency() {
    let app = TestApp::new().await;
    let service = sequence_service(&app);

    // Five concurrent allocations; the compare-and-swap retry budget also
    // covers five rounds, so every task must come back with a number.
    let mut handles = Vec::new();
    for _ in 0..5 {
        let svc = service.clone();
        handles.push(tokio::spawn(async move { svc.next_number().await }));
    }

    let mut ordinals = Vec::new();
    for handle in handles {
        let allocated = handle
            .await
            .expect("task panicked")
            .expect("allocation failed under contention");
        ordinals.push(allocated.ordinal);
    }

    ordinals.sort_unstable();
    assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);

    let row = invoice_sequence::Entity::find_by_id(1)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("counter row");
    assert_eq!(row.current_ordinal, 5);
}

#[tokio::test]
async fn test_year_rollover_restarts_numbering() {
    let app = TestApp::new().await;
    let service = sequence_service(&app);

    let before = service.next_number().await.expect("allocation");
    assert_eq!(before.ordinal, 1);

    // Age the counter row as if it were left over from last December.
    let last_year = Utc::now().year() - 1;
    invoice_sequence::Entity::update_many()
        .col_expr(invoice_sequence::Column::Year, Expr::value(last_year))
        .col_expr(invoice_sequence::Column::CurrentOrdinal, Expr::value(57))
        .filter(invoice_sequence::Column::Id.eq(1))
        .exec(&*app.state.db)
        .await
        .expect("age counter row");

    let first_of_the_year = service.next_number().await.expect("allocation");
    assert_eq!(first_of_the_year.ordinal, 1);
    assert_eq!(first_of_the_year.year, Utc::now().year());
    assert!(first_of_the_year.number.ends_with("00001"));

    let second = service.next_number().await.expect("allocation");
    assert_eq!(second.ordinal, 2);
}

#[tokio::test]
async fn test_reserve_rejects_numbers_already_issued() {
    let app = TestApp::new().await;
    let service = sequence_service(&app);
    let customer = app.seed_customer("kolizja@example.com").await;

    let first = service.next_number().await.expect("allocation");

    // Plant an issued invoice carrying the number the counter will hand
    // out next, as if the counter had been reset underneath the series.
    let (head, _) = first
        .number
        .rsplit_once('/')
        .expect("number has an ordinal segment");
    let colliding = format!("{}/{:05}", head, first.ordinal + 1);

    let planted = invoice_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer.id),
        status: Set(InvoiceRequestStatus::Processed),
        buyer_name: Set("Jan Kowalski".to_string()),
        buyer_address: Set("ul. Polna 1".to_string()),
        buyer_postal_code: Set("00-950".to_string()),
        buyer_city: Set("Warszawa".to_string()),
        buyer_nip: Set(None),
        company: Set(false),
        payment_ids: Set(serde_json::json!([])),
        total: Set(dec!(100.00)),
        invoice_number: Set(Some(colliding.clone())),
        document_path: Set(None),
        comment: Set(None),
        created_at: Set(Utc::now()),
        processed_at: Set(Some(Utc::now())),
    };
    invoice_request::Entity::insert(planted)
        .exec(&*app.state.db)
        .await
        .expect("plant colliding invoice");

    let result = service.reserve(&*app.state.db).await;
    match result {
        Err(ServiceError::NumberCollision(number)) => assert_eq!(number, colliding),
        other => panic!("expected a number collision, got {:?}", other),
    }

    // The counter moved past the collision, so the series recovers by
    // skipping the burned ordinal.
    let recovered = service.reserve(&*app.state.db).await.expect("reservation");
    assert_eq!(recovered.ordinal, first.ordinal + 2);
}
