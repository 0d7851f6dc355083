//! Arena API library
//!
//! Wallet payments with gateway reconciliation, and dispute handling for tournament matches.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::middleware_helpers::{currency_middleware, request_id_middleware, CurrencySettings};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> Result<Self, errors::ServiceError> {
        let services = handlers::AppServices::new(db.clone(), &config)?;
        Ok(Self {
            db,
            config,
            services,
        })
    }
}

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes(config: &config::AppConfig) -> Router<AppState> {
    let payments = Router::new()
        .route("/payments/deposits", post(handlers::payments::create_deposit))
        .route(
            "/payments/withdrawals",
            post(handlers::payments::create_withdrawal),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook)
                .layer(DefaultBodyLimit::max(config.max_webhook_body_bytes)),
        )
        .route("/payments/:id", get(handlers::payments::get_payment));

    let disputes = Router::new()
        .route("/disputes", get(handlers::disputes::list_disputes))
        .route("/disputes/:id", get(handlers::disputes::get_dispute))
        .route(
            "/disputes/:id/review",
            post(handlers::disputes::review_dispute),
        )
        .route(
            "/disputes/:id/resolve",
            post(handlers::disputes::resolve_dispute),
        );

    let matches = Router::new()
        .route(
            "/matches/:id/disputes",
            post(handlers::disputes::raise_dispute),
        )
        .route("/matches/:id/forfeit", post(handlers::matches::forfeit_match))
        .route(
            "/matches/:id/no-contest",
            post(handlers::matches::no_contest_match),
        );

    Router::new().merge(payments).merge(disputes).merge(matches)
}

/// Full application router: health, OpenAPI document and the v1 API, with request ids,
/// HTTP tracing and currency tagging applied. CORS is left to the binary.
pub fn build_router(state: AppState) -> Router {
    let currency = CurrencySettings::from_config(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes(&state.config))
        .layer(axum::middleware::from_fn_with_state(
            currency,
            currency_middleware,
        ))
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}
