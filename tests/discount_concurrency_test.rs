//! Concurrency test for discount usage caps.
//!
//! The usage counter moves through a guarded update, so racing consumers
//! must never push `current_uses` past `max_uses`.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;

#[tokio::test]
async fn discount_cap_survives_concurrent_consumers() {
    let app = TestApp::new().await;
    let discount = app.seed_discount("RACE3", dec!(10), Some(3)).await;

    // Try 10 concurrent consumptions of a 3-use code; expect exactly 3
    // successes.
    let mut tasks = vec![];
    for _ in 0..10 {
        let svc = app.state.discount_service();
        let db = app.state.db.clone();
        let model = discount.clone();
        tasks.push(tokio::spawn(async move {
            svc.consume(&*db, &model).await.is_ok()
        }));
    }

    let mut success = 0;
    for t in tasks {
        if t.await.unwrap_or(false) {
            success += 1;
        }
    }
    assert_eq!(
        success, 3,
        "exactly 3 consumptions should succeed; got {}",
        success
    );

    let code = app
        .state
        .discount_service()
        .get(discount.id)
        .await
        .expect("discount should exist");
    assert_eq!(code.current_uses, 3);

    // The code now reads as exhausted.
    let err = app
        .state
        .discount_service()
        .validate_code("RACE3")
        .await
        .unwrap_err();
    assert_matches!(err, edupay_api::errors::ServiceError::DiscountExhausted(_));
}
