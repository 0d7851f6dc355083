//! Request currency resolution and response currency tagging.
//!
//! The currency comes from the `X-Currency` header or the `currency` query parameter and must
//! be one of the configured codes. Responses then carry it in the `X-Currency` header, and
//! JSON bodies of any status gain a `currency` field unless they already name one.

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request, State},
    http::{header, HeaderName, HeaderValue, Response},
    middleware::Next,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::ServiceError;

pub const CURRENCY_HEADER: &str = "x-currency";

/// Body keys that already state a currency.
const CURRENCY_KEYS: [&str; 4] = [
    "currency",
    "request_currency",
    "client_currency",
    "wallet_currency",
];

/// Currency resolved for the current request, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCurrency(pub String);

/// Marks a response that has already been tagged.
#[derive(Debug, Clone, Copy)]
struct CurrencyApplied;

/// Path prefixes the middleware ignores. Entries are normalized to start with `/`.
#[derive(Debug, Clone, Default)]
pub struct ExcludedPaths(Vec<String>);

impl ExcludedPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = paths
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p.starts_with('/') {
                    p
                } else {
                    format!("/{p}")
                }
            })
            .collect();
        Self(normalized)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct CurrencySettings {
    supported: Arc<Vec<String>>,
    excluded: ExcludedPaths,
}

impl CurrencySettings {
    pub fn new(supported: Vec<String>, excluded: ExcludedPaths) -> Self {
        Self {
            supported: Arc::new(supported),
            excluded,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.supported_currency_list(),
            ExcludedPaths::new(config.currency_excluded_path_list()),
        )
    }

    fn resolve(&self, raw: &str) -> Result<String, ServiceError> {
        let code = raw.trim().to_ascii_uppercase();
        if self.supported.iter().any(|c| *c == code) {
            Ok(code)
        } else {
            Err(ServiceError::InvalidCurrency(raw.trim().to_string()))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CurrencyQuery {
    currency: Option<String>,
}

fn requested_currency(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(CURRENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        Query::<CurrencyQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(query)| query.currency)
            .filter(|v| !v.trim().is_empty())
    })
}

/// Resolves the request currency and tags the response with it.
pub async fn currency_middleware(
    State(settings): State<CurrencySettings>,
    mut request: Request,
    next: Next,
) -> Response<Body> {
    if settings.excluded.matches(request.uri().path()) {
        return next.run(request).await;
    }

    let currency = match requested_currency(&request).map(|raw| settings.resolve(&raw)) {
        Some(Ok(code)) => Some(code),
        Some(Err(err)) => return err.into_response(),
        None => None,
    };
    if let Some(code) = &currency {
        request
            .extensions_mut()
            .insert(RequestCurrency(code.clone()));
    }

    let response = next.run(request).await;
    match currency {
        Some(code) => attach_currency(response, &code).await,
        None => response,
    }
}

async fn attach_currency(response: Response<Body>, currency: &str) -> Response<Body> {
    if response.extensions().get::<CurrencyApplied>().is_some() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    parts.extensions.insert(CurrencyApplied);
    if let Ok(value) = HeaderValue::from_str(currency) {
        parts
            .headers
            .insert(HeaderName::from_static(CURRENCY_HEADER), value);
    }

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return Response::from_parts(parts, body);
    }

    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "could not buffer response body for currency tagging");
            return ServiceError::InternalError("response body unreadable".to_string())
                .into_response();
        }
    };

    let rewritten = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|value| apply_currency(value, currency))
        .and_then(|value| serde_json::to_vec(&value).ok());

    match rewritten {
        Some(new_body) => {
            parts.headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from(new_body.len()),
            );
            Response::from_parts(parts, Body::from(new_body))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}

/// Adds `currency` to a JSON body. Returns `None` when the body is left as is: `null`, or an
/// object that already names a currency. Non-object bodies are wrapped as
/// `{"currency": .., "data": body}`.
pub fn apply_currency(body: Value, currency: &str) -> Option<Value> {
    match body {
        Value::Null => None,
        Value::Object(map) if CURRENCY_KEYS.iter().any(|k| map.contains_key(*k)) => None,
        Value::Object(mut map) => {
            map.insert("currency".into(), Value::String(currency.to_string()));
            Some(Value::Object(map))
        }
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("currency".into(), Value::String(currency.to_string()));
            wrapped.insert("data".into(), other);
            Some(Value::Object(wrapped))
        }
    }
}
