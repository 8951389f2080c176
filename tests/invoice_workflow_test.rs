//! Integration tests for the invoice request workflow.
//!
//! Tests cover:
//! - Requesting an invoice over settled payment records
//! - Approval: number allocation, document rendering, record stamping
//! - Rejection with a mandatory comment and re-requesting afterwards
//! - Company purchases and NIP validation
//! - Eligibility rules: ownership, settlement state, double claims

mod common;

use std::str::FromStr;

use axum::{body, http::Method, response::Response};
use common::TestApp;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 response body")
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {}", other),
    }
}

fn billing_payload(customer_id: Uuid, payment_ids: &[Uuid]) -> Value {
    json!({
        "customer_id": customer_id,
        "payment_ids": payment_ids,
        "buyer_name": "Jan Kowalski",
        "buyer_address": "ul. Polna 1",
        "buyer_postal_code": "00-950",
        "buyer_city": "Warszawa",
    })
}

// ==================== Request and Approval Tests ====================

#[tokio::test]
async fn test_invoice_request_approval_issues_document() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("faktura@example.com").await;
    let (transaction_id, record_ids) = app
        .settle_purchase(customer.id, &[dec!(120.00), dec!(80.00)])
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let request = &body["data"];
    assert_eq!(request["status"], "pending");
    assert_eq!(decimal(&request["total"]), dec!(200.00));
    assert_eq!(request["payment_ids"].as_array().unwrap().len(), 2);
    assert!(request["invoice_number"].is_null());
    let request_id = request["id"].as_str().unwrap().to_string();

    // The request sits in the review queue.
    let queue = app
        .request(Method::GET, "/api/v1/invoices/requests/pending", None)
        .await;
    let queue = response_json(queue).await;
    assert_eq!(queue["data"]["total"], 1);

    let approve = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(approve.status(), 200);
    let approved = response_json(approve).await;
    let processed = &approved["data"];
    assert_eq!(processed["status"], "processed");
    assert!(!processed["processed_at"].is_null());

    let number = processed["invoice_number"].as_str().unwrap().to_string();
    let pattern = Regex::new(r"^FV/\d{4}/\d{2}/00001$").unwrap();
    assert!(pattern.is_match(&number), "unexpected number {}", number);
    assert_eq!(
        processed["document_path"].as_str().unwrap(),
        format!("{}/{}.txt", customer.id, number.replace('/', "_"))
    );

    // Covered records are stamped as invoiced.
    let details = app
        .request(
            Method::GET,
            &format!("/api/v1/transactions/{}", transaction_id),
            None,
        )
        .await;
    let details = response_json(details).await;
    for record in details["data"]["records"].as_array().unwrap() {
        assert_eq!(record["invoiced"], true);
    }

    // The document downloads as plain text.
    let download = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/documents/{}/{}", customer.id, number),
            None,
        )
        .await;
    assert_eq!(download.status(), 200);
    let content_type = download
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let document = response_text(download).await;
    assert!(document.contains(&format!("VAT INVOICE {}", number)));
    assert!(document.contains("Jan Kowalski"));
    assert!(document.contains("Total due:"));

    // Queue is drained and the customer was notified.
    let queue = app
        .request(Method::GET, "/api/v1/invoices/requests/pending", None)
        .await;
    let queue = response_json(queue).await;
    assert_eq!(queue["data"]["total"], 0);

    let inbox = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{}/notifications", customer.id),
            None,
        )
        .await;
    let inbox = response_json(inbox).await;
    let kinds: Vec<&str> = inbox["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"invoice_processed"));
}

#[tokio::test]
async fn test_reapproval_of_processed_request_is_idempotent() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("twice@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(99.00)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    let body = response_json(response).await;
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let first = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": true })),
        )
        .await;
    let first = response_json(first).await;
    let number = first["data"]["invoice_number"].as_str().unwrap().to_string();

    let second = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(second.status(), 200);
    let second = response_json(second).await;
    assert_eq!(second["data"]["invoice_number"].as_str().unwrap(), number);
}

#[tokio::test]
async fn test_sequential_approvals_draw_consecutive_numbers() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("seria@example.com").await;
    let pattern = Regex::new(r"^FV/(\d{4})/(\d{2})/(\d{5})$").unwrap();

    let mut ordinals = Vec::new();
    for _ in 0..2 {
        let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(50.00)]).await;
        let response = app
            .request(
                Method::POST,
                "/api/v1/invoices/requests",
                Some(billing_payload(customer.id, &record_ids)),
            )
            .await;
        let body = response_json(response).await;
        let request_id = body["data"]["id"].as_str().unwrap().to_string();

        let approve = app
            .request(
                Method::POST,
                &format!("/api/v1/invoices/requests/{}/process", request_id),
                Some(json!({ "approve": true })),
            )
            .await;
        assert_eq!(approve.status(), 200);
        let approved = response_json(approve).await;
        let number = approved["data"]["invoice_number"].as_str().unwrap().to_string();
        let captures = pattern.captures(&number).expect("well-formed number");
        ordinals.push(captures[3].parse::<i32>().unwrap());
    }

    assert_eq!(ordinals, vec![1, 2]);
}

// ==================== Rejection Tests ====================

#[tokio::test]
async fn test_rejection_requires_comment() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("no.comment@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(75.00)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    let body = response_json(response).await;
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let reject = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": false })),
        )
        .await;
    assert_eq!(reject.status(), 400);

    // Still pending after the refused rejection.
    let current = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/requests/{}", request_id),
            None,
        )
        .await;
    let current = response_json(current).await;
    assert_eq!(current["data"]["status"], "pending");
}

#[tokio::test]
async fn test_rejected_records_can_be_requested_again() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("odrzucona@example.com").await;
    let (transaction_id, record_ids) =
        app.settle_purchase(customer.id, &[dec!(130.00)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    let body = response_json(response).await;
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let reject = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": false, "comment": "Niepoprawny adres nabywcy" })),
        )
        .await;
    assert_eq!(reject.status(), 200);
    let rejected = response_json(reject).await;
    assert_eq!(rejected["data"]["status"], "rejected");
    assert_eq!(rejected["data"]["comment"], "Niepoprawny adres nabywcy");

    // Records were never stamped, so they stay available.
    let details = app
        .request(
            Method::GET,
            &format!("/api/v1/transactions/{}", transaction_id),
            None,
        )
        .await;
    let details = response_json(details).await;
    for record in details["data"]["records"].as_array().unwrap() {
        assert_eq!(record["invoiced"], false);
    }

    let retry = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    assert_eq!(retry.status(), 201);

    // The rejection landed in the inbox.
    let inbox = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{}/notifications", customer.id),
            None,
        )
        .await;
    let inbox = response_json(inbox).await;
    let kinds: Vec<&str> = inbox["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"invoice_rejected"));
}

#[tokio::test]
async fn test_processing_terminal_request_conflicts() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("terminal@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(60.00)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    let body = response_json(response).await;
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let reject = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": false, "comment": "duplikat" })),
        )
        .await;
    assert_eq!(reject.status(), 200);

    // Neither decision applies to a rejected request.
    let approve = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(approve.status(), 409);

    let reject_again = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": false, "comment": "jeszcze raz" })),
        )
        .await;
    assert_eq!(reject_again.status(), 409);
}

// ==================== Company and NIP Tests ====================

#[tokio::test]
async fn test_company_request_without_nip_blocks_approval_only() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("firma@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(500.00)]).await;

    let mut payload = billing_payload(customer.id, &record_ids);
    payload["company"] = json!(true);
    payload["buyer_name"] = json!("Szkolenia IT Sp. z o.o.");

    // Accepted at request time; the company rule bites at approval.
    let response = app
        .request(Method::POST, "/api/v1/invoices/requests", Some(payload))
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let approve = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(approve.status(), 400);

    let current = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/requests/{}", request_id),
            None,
        )
        .await;
    let current = response_json(current).await;
    assert_eq!(current["data"]["status"], "pending");
}

#[tokio::test]
async fn test_company_request_with_nip_approves() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("spolka@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(500.00)]).await;

    let mut payload = billing_payload(customer.id, &record_ids);
    payload["company"] = json!(true);
    payload["buyer_nip"] = json!("123-456-32-18");

    let response = app
        .request(Method::POST, "/api/v1/invoices/requests", Some(payload))
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    // Separators are stripped on the way in.
    assert_eq!(body["data"]["buyer_nip"], "1234563218");
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let approve = app
        .request(
            Method::POST,
            &format!("/api/v1/invoices/requests/{}/process", request_id),
            Some(json!({ "approve": true })),
        )
        .await;
    assert_eq!(approve.status(), 200);
    let approved = response_json(approve).await;
    assert_eq!(approved["data"]["status"], "processed");

    // The NIP prints on the document.
    let number = approved["data"]["invoice_number"].as_str().unwrap();
    let download = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/documents/{}/{}", customer.id, number),
            None,
        )
        .await;
    let document = response_text(download).await;
    assert!(document.contains("NIP: 1234563218"));
}

#[tokio::test]
async fn test_invalid_nip_rejected_at_request() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("zly.nip@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(100.00)]).await;

    let mut payload = billing_payload(customer.id, &record_ids);
    payload["buyer_nip"] = json!("7770003698");

    let response = app
        .request(Method::POST, "/api/v1/invoices/requests", Some(payload))
        .await;
    assert_eq!(response.status(), 400);
}

// ==================== Eligibility Tests ====================

#[tokio::test]
async fn test_unsettled_records_are_not_invoiceable() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("przed.zaplata@example.com").await;

    // Checkout without settlement leaves the records pending.
    let checkout = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "customer_id": customer.id,
                "items": [
                    { "course_id": Uuid::new_v4(), "title": "Course", "amount": "90.00" },
                ],
            })),
        )
        .await;
    let checkout = response_json(checkout).await;
    let transaction_id: Uuid = checkout["data"]["transaction_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let details = app
        .request(
            Method::GET,
            &format!("/api/v1/transactions/{}", transaction_id),
            None,
        )
        .await;
    let details = response_json(details).await;
    let record_id: Uuid = details["data"]["records"][0]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &[record_id])),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_records_of_another_customer_are_rejected() {
    let app = TestApp::new().await;
    let owner = app.seed_customer("owner@example.com").await;
    let intruder = app.seed_customer("intruder@example.com").await;
    let (_, record_ids) = app.settle_purchase(owner.id, &[dec!(80.00)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(intruder.id, &record_ids)),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_unknown_records_are_not_found() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("ghost.records@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &[Uuid::new_v4()])),
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_empty_payment_ids_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("pusta.lista@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &[])),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_duplicate_record_ids_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("dwa.razy@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(40.00)]).await;

    let duplicated = vec![record_ids[0], record_ids[0]];
    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &duplicated)),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_record_claimed_by_open_request_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("zajety@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(150.00)]).await;

    let first = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    assert_eq!(first.status(), 201);

    // The same record cannot back a second open request.
    let second = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    assert_eq!(second.status(), 400);
}

#[tokio::test]
async fn test_get_unknown_request_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/requests/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_customer_invoice_listing() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("lista.faktur@example.com").await;
    let (_, record_ids) = app.settle_purchase(customer.id, &[dec!(45.00)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/invoices/requests",
            Some(billing_payload(customer.id, &record_ids)),
        )
        .await;
    assert_eq!(response.status(), 201);

    let listing = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{}/invoices", customer.id),
            None,
        )
        .await;
    assert_eq!(listing.status(), 200);
    let listing = response_json(listing).await;
    assert_eq!(listing["data"]["total"], 1);
    assert_eq!(listing["data"]["items"][0]["status"], "pending");
}

#[tokio::test]
async fn test_missing_document_not_found() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("brak.pliku@example.com").await;

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/invoices/documents/{}/FV/2026/01/00042",
                customer.id
            ),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}
