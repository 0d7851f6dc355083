mod common;

use arena_api::entities::{
    dispute::{self, DisputeStatus},
    transaction::{self, TransactionStatus, TransactionType},
    user::UserRole,
};
use arena_api::errors::{build_error_response, classify_db_error, ErrorFallback, ServiceError};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DbErr, Set};

use common::TestApp;

async fn insert_transaction(app: &TestApp, user_id: i32, reference: &str) -> Result<(), DbErr> {
    transaction::ActiveModel {
        user_id: Set(user_id),
        transaction_type: Set(TransactionType::Deposit),
        amount: Set(dec!(10)),
        balance_before: Set(Decimal::ZERO),
        balance_after: Set(dec!(10)),
        status: Set(TransactionStatus::Pending),
        transaction_reference: Set(Some(reference.to_string())),
        currency: Set("TZS".to_string()),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .map(|_| ())
}

#[tokio::test]
async fn duplicate_reference_is_already_exists() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, Decimal::ZERO, "TZS").await;

    insert_transaction(&app, player.id, "DEPO-1").await.unwrap();
    let err = insert_transaction(&app, player.id, "DEPO-1")
        .await
        .expect_err("duplicate reference");

    let classified = classify_db_error(&err);
    assert_eq!(classified.status, StatusCode::CONFLICT);
    assert_eq!(classified.code, Some("ALREADY_EXISTS"));
    assert_eq!(classified.message, "Already exists.");

    let response = build_error_response(&ServiceError::DatabaseError(err), &ErrorFallback::default());
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.code, Some("ALREADY_EXISTS"));
}

#[tokio::test]
async fn missing_parent_row_is_an_invalid_reference() {
    let app = TestApp::new().await;

    let err = insert_transaction(&app, 9_999, "DEPO-ORPHAN")
        .await
        .expect_err("unknown user");

    let classified = classify_db_error(&err);
    assert_eq!(classified.status, StatusCode::BAD_REQUEST);
    assert_eq!(classified.code, Some("INVALID_REFERENCE"));
    assert_eq!(classified.message, "Invalid reference.");
}

#[tokio::test]
async fn dispute_on_unknown_match_is_an_invalid_reference() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, Decimal::ZERO, "TZS").await;

    let err = dispute::ActiveModel {
        match_id: Set(4_242),
        raised_by_user_id: Set(player.id),
        reason: Set("score was misreported".to_string()),
        status: Set(DisputeStatus::Open),
        ..Default::default()
    }
    .insert(app.db())
    .await
    .expect_err("unknown match");

    let response = build_error_response(&ServiceError::DatabaseError(err), &ErrorFallback::default());
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code, Some("INVALID_REFERENCE"));
    assert_eq!(response.message, "Invalid reference.");
}
