mod common;

use arena_api::entities::user::UserRole;
use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;

use common::{response_json, TestApp};

#[tokio::test]
async fn unsupported_currency_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.create_user("ops", UserRole::Admin, Decimal::ZERO, "USD").await;

    let response = app
        .request_as_with_headers(
            &admin,
            Method::GET,
            "/api/v1/disputes",
            None,
            &[("X-Currency", "XYZ")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get("x-currency").is_none());
    assert_eq!(response_json(response).await["code"], "INVALID_CURRENCY");
}

#[tokio::test]
async fn list_bodies_are_wrapped_with_the_currency() {
    let app = TestApp::new().await;
    let admin = app.create_user("ops", UserRole::Admin, Decimal::ZERO, "USD").await;

    let response = app
        .request_as_with_headers(
            &admin,
            Method::GET,
            "/api/v1/disputes",
            None,
            &[("X-Currency", " usd ")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-currency"], "USD");
    let body = response_json(response).await;
    assert_eq!(body["currency"], "USD");
    assert!(body["data"].as_array().is_some_and(Vec::is_empty));
}

#[tokio::test]
async fn query_parameter_is_used_without_header() {
    let app = TestApp::new().await;
    let admin = app.create_user("ops", UserRole::Admin, Decimal::ZERO, "USD").await;

    let response = app
        .request_as(&admin, Method::GET, "/api/v1/disputes?currency=tzs", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-currency"], "TZS");
}

#[tokio::test]
async fn percent_encoded_query_values_are_decoded() {
    let app = TestApp::new().await;
    let admin = app.create_user("ops", UserRole::Admin, Decimal::ZERO, "USD").await;

    let response = app
        .request_as(&admin, Method::GET, "/api/v1/disputes?page=1&currency=T%5AS", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-currency"], "TZS");
    assert_eq!(response_json(response).await["currency"], "TZS");
}

#[tokio::test]
async fn error_bodies_are_tagged_too() {
    let app = TestApp::new().await;
    let admin = app.create_user("ops", UserRole::Admin, Decimal::ZERO, "USD").await;

    let response = app
        .request_as_with_headers(
            &admin,
            Method::GET,
            "/api/v1/disputes/404",
            None,
            &[("X-Currency", "USD")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-currency"], "USD");
    assert_eq!(
        response_json(response).await,
        serde_json::json!({ "message": "Dispute not found.", "currency": "USD" })
    );
}

#[tokio::test]
async fn excluded_paths_are_untouched() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/health", None, &[("X-Currency", "XYZ")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-currency").is_none());
    assert!(response_json(response).await.get("currency").is_none());
}

#[tokio::test]
async fn requests_without_currency_pass_through() {
    let app = TestApp::new().await;
    let admin = app.create_user("ops", UserRole::Admin, Decimal::ZERO, "USD").await;

    let response = app
        .request_as(&admin, Method::GET, "/api/v1/disputes", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-currency").is_none());
    assert!(response_json(response).await.is_array());
}
