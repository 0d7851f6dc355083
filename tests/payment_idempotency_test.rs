mod common;

use arena_api::entities::{
    payment_record, transaction,
    user::{self, UserRole},
};
use arena_api::services::checksum::PayloadSigner;
use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use common::{response_json, TestApp, CHECKSUM_KEY};

fn deposit_body() -> serde_json::Value {
    json!({
        "amount": "2500.00",
        "currency": "TZS",
        "phone_number": "255712345678"
    })
}

fn decimal(value: &serde_json::Value) -> Decimal {
    value
        .as_str()
        .expect("decimals serialize as strings")
        .parse()
        .expect("decimal string")
}

async fn wallet(app: &TestApp, id: i32) -> Decimal {
    user::Entity::find_by_id(id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap()
        .wallet_balance
}

#[tokio::test]
async fn same_key_creates_one_record_and_replays() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;

    let first = app
        .request_as_with_headers(
            &player,
            Method::POST,
            "/api/v1/payments/deposits",
            Some(deposit_body()),
            &[("Idempotency-Key", "dep-001")],
        )
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = response_json(first).await;
    assert_eq!(first["replayed"], false);
    assert_eq!(first["status"], "pending");
    assert_eq!(first["idempotency_key"], "dep-001");
    assert!(first["order_reference"].as_str().unwrap().starts_with("DEPO"));
    assert_eq!(first["customer_phone"], "*********678");
    assert_eq!(first["transaction"]["type"], "deposit");

    let second = app
        .request_as_with_headers(
            &player,
            Method::POST,
            "/api/v1/payments/deposits",
            Some(deposit_body()),
            &[("Idempotency-Key", "dep-001")],
        )
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = response_json(second).await;
    assert_eq!(second["replayed"], true);
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["order_reference"], first["order_reference"]);

    assert_eq!(payment_record::Entity::find().count(app.db()).await.unwrap(), 1);
    assert_eq!(transaction::Entity::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test]
async fn keys_are_scoped_per_user() {
    let app = TestApp::new().await;
    let asha = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;
    let juma = app.create_user("juma", UserRole::Player, dec!(0), "TZS").await;

    for player in [&asha, &juma] {
        let response = app
            .request_as_with_headers(
                player,
                Method::POST,
                "/api/v1/payments/deposits",
                Some(deposit_body()),
                &[("Idempotency-Key", "shared-key")],
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    assert_eq!(payment_record::Entity::find().count(app.db()).await.unwrap(), 2);
}

#[tokio::test]
async fn concurrent_retries_resolve_to_one_record() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;

    let send = || {
        app.request_as_with_headers(
            &player,
            Method::POST,
            "/api/v1/payments/deposits",
            Some(deposit_body()),
            &[("Idempotency-Key", "dep-race")],
        )
    };
    let (a, b) = tokio::join!(send(), send());

    let mut statuses = vec![a.status(), b.status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CREATED]);
    assert_eq!(payment_record::Entity::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test]
async fn withdrawal_debits_once_and_requires_funds() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(1000), "TZS").await;
    let body = json!({ "amount": 600, "currency": "TZS", "phone_number": "+255 712 345 678" });

    for _ in 0..2 {
        let response = app
            .request_as_with_headers(
                &player,
                Method::POST,
                "/api/v1/payments/withdrawals",
                Some(body.clone()),
                &[("Idempotency-Key", "wd-1")],
            )
            .await;
        assert!(response.status().is_success());
        let json = response_json(response).await;
        assert_eq!(decimal(&json["transaction"]["balance_before"]), dec!(1000));
        assert_eq!(decimal(&json["transaction"]["balance_after"]), dec!(400));
    }
    assert_eq!(wallet(&app, player.id).await, dec!(400));

    let response = app
        .request_as_with_headers(
            &player,
            Method::POST,
            "/api/v1/payments/withdrawals",
            Some(body),
            &[("Idempotency-Key", "wd-2")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["code"], "INSUFFICIENT_FUNDS");
    assert_eq!(wallet(&app, player.id).await, dec!(400));
    assert_eq!(payment_record::Entity::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test]
async fn currency_must_match_wallet() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;

    let response = app
        .request_as(
            &player,
            Method::POST,
            "/api/v1/payments/deposits",
            Some(json!({ "amount": "10", "currency": "USD", "phone_number": "255712345678" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response_json(response).await["code"], "CURRENCY_MISMATCH");
}

#[tokio::test]
async fn request_currency_is_used_when_body_omits_it() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;

    let response = app
        .request_as_with_headers(
            &player,
            Method::POST,
            "/api/v1/payments/deposits",
            Some(json!({ "amount": "10", "phone_number": "255712345678" })),
            &[("X-Currency", "tzs")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-currency"], "TZS");
    assert_eq!(response_json(response).await["currency"], "TZS");
}

#[tokio::test]
async fn invalid_amounts_are_rejected() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;

    for amount in ["0", "-5", "1.001"] {
        let response = app
            .request_as(
                &player,
                Method::POST,
                "/api/v1/payments/deposits",
                Some(json!({ "amount": amount, "currency": "TZS", "phone_number": "255712345678" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "amount {amount}");
    }
}

#[tokio::test]
async fn gateway_request_carries_a_valid_checksum() {
    let app = TestApp::new().await;
    let player = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;

    let response = app
        .request_as(
            &player,
            Method::POST,
            "/api/v1/payments/deposits",
            Some(deposit_body()),
        )
        .await;
    let body = response_json(response).await;
    let request = &body["gateway_request"];
    assert_eq!(request["checksumMethod"], "canonical");
    assert_eq!(request["orderReference"], body["order_reference"]);
    assert!(PayloadSigner::new(CHECKSUM_KEY).verify(request));
}

#[tokio::test]
async fn payments_are_private_to_owner_and_admins() {
    let app = TestApp::new().await;
    let owner = app.create_user("asha", UserRole::Player, dec!(0), "TZS").await;
    let other = app.create_user("juma", UserRole::Player, dec!(0), "TZS").await;
    let admin = app.create_user("ops", UserRole::Admin, dec!(0), "TZS").await;

    let created = app
        .request_as(&owner, Method::POST, "/api/v1/payments/deposits", Some(deposit_body()))
        .await;
    let id = response_json(created).await["id"].as_i64().unwrap();
    let uri = format!("/api/v1/payments/{id}");

    let response = app.request_as(&owner, Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["replayed"], false);

    assert_eq!(
        app.request_as(&admin, Method::GET, &uri, None).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        app.request_as(&other, Method::GET, &uri, None).await.status(),
        StatusCode::NOT_FOUND
    );
}
