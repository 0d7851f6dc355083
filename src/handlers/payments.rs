use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Actor,
    entities::{
        payment_record::PaymentStatus,
        transaction::{self, TransactionStatus, TransactionType},
    },
    errors::{ErrorBody, ServiceError},
    middleware_helpers::RequestCurrency,
    services::payments::{InitiatePayment, PaymentKind, PaymentOutcome},
    AppState,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InitiatePaymentRequest {
    #[schema(value_type = String, example = "1000.00")]
    pub amount: Decimal,
    /// Defaults to the request currency (`X-Currency` / `?currency=`)
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
    #[validate(length(min = 9, max = 20))]
    pub phone_number: String,
    #[validate(length(min = 1, max = 32))]
    pub payment_method: Option<String>,
    /// Ignored when the `Idempotency-Key` header is present
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionSummary {
    pub id: i32,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub balance_before: Decimal,
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    pub transaction_reference: Option<String>,
}

impl From<transaction::Model> for TransactionSummary {
    fn from(model: transaction::Model) -> Self {
        Self {
            id: model.id,
            transaction_type: model.transaction_type,
            status: model.status,
            amount: model.amount,
            balance_before: model.balance_before,
            balance_after: model.balance_after,
            transaction_reference: model.transaction_reference,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: i32,
    pub order_reference: String,
    pub gateway_payment_id: Option<String>,
    pub status: PaymentStatus,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    /// Masked; only the last three digits are shown
    pub customer_phone: Option<String>,
    pub idempotency_key: Option<String>,
    /// True when this response repeats an earlier request with the same idempotency key
    pub replayed: bool,
    /// Signed request for the payment gateway
    #[schema(value_type = Option<Object>)]
    pub gateway_request: Option<Value>,
    pub transaction: TransactionSummary,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl From<PaymentOutcome> for PaymentResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        let gateway_request = outcome.gateway_request().cloned();
        let idempotency_key = outcome.record.idempotency_key().map(str::to_string);
        let PaymentOutcome {
            record,
            transaction,
            replayed,
            customer_phone_masked,
        } = outcome;

        Self {
            id: record.id,
            order_reference: record.order_reference,
            gateway_payment_id: record.gateway_payment_id,
            status: record.status,
            amount: record.amount,
            currency: record.currency,
            payment_method: record.payment_method,
            customer_phone: customer_phone_masked,
            idempotency_key,
            replayed,
            gateway_request,
            transaction: transaction.into(),
            created_at: record.created_at,
            completed_at: record.completed_at,
            failed_at: record.failed_at,
        }
    }
}

async fn initiate(
    state: AppState,
    actor: Actor,
    kind: PaymentKind,
    headers: &HeaderMap,
    request_currency: Option<RequestCurrency>,
    payload: InitiatePaymentRequest,
) -> Result<(StatusCode, Json<PaymentResponse>), ServiceError> {
    payload.validate()?;

    let currency = payload
        .currency
        .or(request_currency.map(|RequestCurrency(code)| code))
        .ok_or_else(|| ServiceError::ValidationError("Currency is required.".to_string()))?;

    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .services
        .payments
        .initiate(
            &actor,
            kind,
            InitiatePayment {
                amount: payload.amount,
                currency,
                phone_number: payload.phone_number,
                payment_method: payload.payment_method,
                idempotency_key: header_key.or(payload.idempotency_key),
                description: payload.description,
            },
        )
        .await?;

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/deposits",
    request_body = InitiatePaymentRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Deduplicates retries")),
    responses(
        (status = 201, description = "Deposit initiated", body = PaymentResponse),
        (status = 200, description = "Replay of an earlier request with the same key", body = PaymentResponse),
        (status = 400, description = "Invalid amount, currency or phone number", body = ErrorBody),
        (status = 409, description = "Currency differs from the wallet currency", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn create_deposit(
    State(state): State<AppState>,
    actor: Actor,
    request_currency: Option<Extension<RequestCurrency>>,
    headers: HeaderMap,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ServiceError> {
    initiate(
        state,
        actor,
        PaymentKind::Deposit,
        &headers,
        request_currency.map(|Extension(c)| c),
        payload,
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/withdrawals",
    request_body = InitiatePaymentRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Deduplicates retries")),
    responses(
        (status = 201, description = "Withdrawal initiated and wallet debited", body = PaymentResponse),
        (status = 200, description = "Replay of an earlier request with the same key", body = PaymentResponse),
        (status = 400, description = "Invalid input or insufficient funds", body = ErrorBody),
        (status = 409, description = "Currency differs from the wallet currency", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn create_withdrawal(
    State(state): State<AppState>,
    actor: Actor,
    request_currency: Option<Extension<RequestCurrency>>,
    headers: HeaderMap,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ServiceError> {
    initiate(
        state,
        actor,
        PaymentKind::Withdrawal,
        &headers,
        request_currency.map(|Extension(c)| c),
        payload,
    )
    .await
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = i32, Path, description = "Payment record ID")),
    responses(
        (status = 200, description = "Payment record", body = PaymentResponse),
        (status = 404, description = "Payment not found", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i32>,
) -> Result<Json<PaymentResponse>, ServiceError> {
    let outcome = state.services.payments.get_payment(&actor, id).await?;
    Ok(Json(outcome.into()))
}
