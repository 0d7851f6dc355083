#![allow(dead_code)]

use std::sync::Arc;

use arena_api::{
    auth::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    config::AppConfig,
    db,
    entities::{
        game_match::{self, MatchStatus},
        tournament, tournament_participant,
        user::{self, UserRole},
    },
    services::checksum::sign_webhook_body,
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tower::ServiceExt;

pub const ENCRYPTION_SECRET: &str = "test-encryption-secret-with-at-least-32-chars";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const CHECKSUM_KEY: &str = "gateway-checksum-key";

/// Application backed by a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            ENCRYPTION_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.gateway_checksum_key = Some(CHECKSUM_KEY.to_string());
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg).expect("valid test state");
        let router = arena_api::build_router(state.clone());

        Self { router, state }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router call")
    }

    /// Request on behalf of `user`, using their stored role.
    pub async fn request_as(
        &self,
        user: &user::Model,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request_as_with_headers(user, method, uri, body, &[])
            .await
    }

    pub async fn request_as_with_headers(
        &self,
        user: &user::Model,
        method: Method,
        uri: &str,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> Response {
        let id = user.id.to_string();
        let role = user.role.to_string();
        let mut headers = vec![(ACTOR_ID_HEADER, id.as_str()), (ACTOR_ROLE_HEADER, role.as_str())];
        headers.extend_from_slice(extra);
        self.request(method, uri, body, &headers).await
    }

    /// Posts a raw webhook body, signed with the test secret unless `signature` overrides it.
    pub async fn send_webhook(&self, raw: &str, signature: Option<&str>) -> Response {
        let signed = sign_webhook_body(WEBHOOK_SECRET.as_bytes(), raw.as_bytes());
        let signature = signature.unwrap_or(&signed);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-clickpesa-signature", signature)
            .body(Body::from(raw.to_string()))
            .expect("build webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call")
    }

    pub async fn create_user(
        &self,
        username: &str,
        role: UserRole,
        balance: Decimal,
        currency: &str,
    ) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(format!("{username}@arena.test")),
            role: Set(role),
            wallet_balance: Set(balance),
            wallet_currency: Set(currency.to_string()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert user")
    }

    pub async fn create_tournament(&self, name: &str) -> tournament::Model {
        tournament::ActiveModel {
            name: Set(name.to_string()),
            game: Set(Some("chess".to_string())),
            status: Set("in_progress".to_string()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert tournament")
    }

    pub async fn add_participant(
        &self,
        tournament_id: i32,
        user_id: i32,
    ) -> tournament_participant::Model {
        tournament_participant::ActiveModel {
            tournament_id: Set(tournament_id),
            user_id: Set(user_id),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert participant")
    }

    pub async fn create_match(
        &self,
        tournament_id: i32,
        participant1_id: i32,
        participant2_id: i32,
        status: MatchStatus,
    ) -> game_match::Model {
        game_match::ActiveModel {
            tournament_id: Set(tournament_id),
            round_number: Set(1),
            participant1_id: Set(Some(participant1_id)),
            participant2_id: Set(Some(participant2_id)),
            status: Set(status),
            winner_id: Set(None),
            confirmed_by_user_id: Set(None),
            confirmed_at: Set(None),
            resolved_reason: Set(None),
            resolved_at: Set(None),
            resolved_by: Set(None),
            forfeit_user_id: Set(None),
            forfeit_participant_id: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("insert match")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
