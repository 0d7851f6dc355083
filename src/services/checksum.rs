//! Checksums for payment-gateway payloads.
//!
//! Both sides build payload objects independently, so the signed text is a canonical
//! serialization: `checksum`/`checksumMethod` removed from the top level, object keys sorted
//! recursively, array order preserved, no insignificant whitespace.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKSUM_FIELD: &str = "checksum";
pub const CHECKSUM_METHOD_FIELD: &str = "checksumMethod";
pub const CHECKSUM_METHOD: &str = "canonical";

/// Canonical text of `payload` for signing.
pub fn canonicalize(payload: &Value) -> String {
    let mut out = String::new();
    match payload {
        Value::Object(map) => {
            let signed: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(key, _)| *key != CHECKSUM_FIELD && *key != CHECKSUM_METHOD_FIELD)
                .collect();
            write_object(&mut out, signed);
        }
        other => write_value(&mut out, other),
    }
    out
}

/// Canonicalizes any serializable payload. Fails only when the value cannot be represented
/// as JSON (for example a map with non-string keys).
pub fn canonicalize_serializable<T: Serialize>(payload: &T) -> Result<String, ServiceError> {
    let value = serde_json::to_value(payload)?;
    Ok(canonicalize(&value))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map.iter().collect()),
    }
}

fn write_object(out: &mut String, mut entries: Vec<(&String, &Value)>) {
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    // serde_json's escaping is deterministic for a given string.
    out.push_str(&Value::String(s.to_owned()).to_string());
}

/// Signs and verifies gateway payloads with HMAC-SHA256 over the canonical form.
#[derive(Clone)]
pub struct PayloadSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for PayloadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSigner").finish_non_exhaustive()
    }
}

impl PayloadSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size")
    }

    /// Lower-case hex HMAC of the canonical payload.
    pub fn sign(&self, payload: &Value) -> String {
        let mut mac = self.mac();
        mac.update(canonicalize(payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Returns `payload` with `checksum` and `checksumMethod` set. Non-object payloads are
    /// returned unchanged.
    pub fn attach(&self, payload: Value) -> Value {
        let checksum = self.sign(&payload);
        match payload {
            Value::Object(mut map) => {
                map.insert(CHECKSUM_FIELD.into(), Value::String(checksum));
                map.insert(
                    CHECKSUM_METHOD_FIELD.into(),
                    Value::String(CHECKSUM_METHOD.into()),
                );
                Value::Object(map)
            }
            other => other,
        }
    }

    /// Checks the payload's embedded checksum in constant time.
    pub fn verify(&self, payload: &Value) -> bool {
        let Some(expected) = payload
            .get(CHECKSUM_FIELD)
            .and_then(Value::as_str)
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
        else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(canonicalize(payload).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

/// Verifies a webhook signature: hex HMAC-SHA256 of the raw request body.
pub fn verify_webhook_signature(secret: &[u8], raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature for `raw_body`, as the gateway would send it.
pub fn sign_webhook_body(secret: &[u8], raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
