use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Arena API",
        version = "0.1.0",
        description = r#"
# Arena API

Wallet payments, payment-gateway webhooks and match dispute resolution for Arena tournaments.

## Identity

Authentication happens upstream. Requests carry the acting user in `x-actor-id` and, for
administrators, `x-actor-role: admin`.

## Currency

Send `X-Currency` (or `?currency=`) with a supported code. Successful JSON responses then carry
the same code in an `X-Currency` header and in a `currency` body field.

## Idempotency

Payment initiation accepts an `Idempotency-Key` header. Repeating a key returns the original
payment with `replayed: true` and status 200.

## Errors

Failures return `{"message": "...", "code": "..."}`; `code` is omitted where none applies.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    tags(
        (name = "Payments", description = "Deposits, withdrawals and gateway webhooks"),
        (name = "Disputes", description = "Match result disputes"),
        (name = "Matches", description = "Administrative match resolution"),
        (name = "Operations", description = "Health checks")
    ),
    paths(
        // Payments
        crate::handlers::payments::create_deposit,
        crate::handlers::payments::create_withdrawal,
        crate::handlers::payments::get_payment,
        crate::handlers::payment_webhooks::payment_webhook,

        // Disputes
        crate::handlers::disputes::raise_dispute,
        crate::handlers::disputes::list_disputes,
        crate::handlers::disputes::get_dispute,
        crate::handlers::disputes::review_dispute,
        crate::handlers::disputes::resolve_dispute,

        // Matches
        crate::handlers::matches::forfeit_match,
        crate::handlers::matches::no_contest_match,

        crate::handlers::health::health,
    ),
    components(
        schemas(
            crate::handlers::payments::InitiatePaymentRequest,
            crate::handlers::payments::PaymentResponse,
            crate::handlers::payments::TransactionSummary,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::handlers::disputes::RaiseDisputeRequest,
            crate::handlers::disputes::ResolveDisputeRequest,
            crate::handlers::disputes::DisputeResponse,
            crate::handlers::disputes::DisputeDetailResponse,
            crate::handlers::matches::ForfeitRequest,
            crate::handlers::matches::NoContestRequest,
            crate::handlers::matches::MatchResponse,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorBody
        )
    )
)]
pub struct ApiDocV1;

/// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        for path in [
            "/api/v1/payments/deposits",
            "/api/v1/payments/withdrawals",
            "/api/v1/payments/{id}",
            "/api/v1/payments/webhook",
            "/api/v1/matches/{id}/disputes",
            "/api/v1/disputes/{id}/resolve",
            "/api/v1/matches/{id}/no-contest",
            "/health",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
    }
}
