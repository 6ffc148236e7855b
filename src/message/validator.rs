use serde_json::{Map, Value};
use thiserror::Error;

use super::InboundMessage;

/// Why an inbound payload was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("missing or non-string `type` discriminant")]
    MissingType,
    #[error("empty `type` discriminant")]
    EmptyType,
    #[error("malformed `{kind}` payload: {reason}")]
    MalformedPayload { kind: String, reason: String },
}

/// Structural check on an untrusted value: a non-null object with a
/// non-empty string `type`. Returns the discriminant and the object.
pub fn validate(raw: &Value) -> Result<(&str, &Map<String, Value>), Rejection> {
    let envelope = raw.as_object().ok_or(Rejection::NotAnObject)?;
    let message_type = envelope
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Rejection::MissingType)?;
    if message_type.trim().is_empty() {
        return Err(Rejection::EmptyType);
    }
    Ok((message_type, envelope))
}

/// Type guard form of [`validate`].
pub fn is_valid_envelope(raw: &Value) -> bool {
    validate(raw).is_ok()
}

/// Validates then decodes. Never panics on any input.
pub fn decode(raw: &Value) -> Result<InboundMessage, Rejection> {
    let (message_type, envelope) = validate(raw)?;
    InboundMessage::from_envelope(message_type, envelope).map_err(|e| Rejection::MalformedPayload {
        kind: message_type.to_string(),
        reason: e.to_string(),
    })
}
