use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    errors::{ErrorBody, ServiceError},
    services::webhooks::WebhookOutcome,
    AppState,
};

/// Checked in order; the first present header is used.
pub const SIGNATURE_HEADERS: [&str; 3] = ["x-clickpesa-signature", "x-signature", "signature"];

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body(content = String, description = "Raw gateway JSON payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Webhook processed or already processed", body = WebhookAck),
        (status = 400, description = "Missing signature or malformed payload", body = ErrorBody),
        (status = 401, description = "Invalid signature", body = ErrorBody),
        (status = 500, description = "Processing failed; safe to retry", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let outcome = state
        .services
        .webhooks
        .handle(&body, signature_header(&headers))
        .await?;

    let ack = match outcome {
        WebhookOutcome::Processed { event, result } => WebhookAck {
            success: true,
            message: "Webhook processed successfully".to_string(),
            event: Some(event),
            data: Some(result),
        },
        WebhookOutcome::Replayed => WebhookAck {
            success: true,
            message: "Webhook already processed".to_string(),
            event: None,
            data: None,
        },
    };
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn gateway_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("signature", HeaderValue::from_static("generic"));
        headers.insert("x-clickpesa-signature", HeaderValue::from_static("gateway"));
        assert_eq!(signature_header(&headers), Some("gateway"));

        headers.remove("x-clickpesa-signature");
        assert_eq!(signature_header(&headers), Some("generic"));
        assert_eq!(signature_header(&HeaderMap::new()), None);
    }
}
