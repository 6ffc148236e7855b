//! # Envelopes
//!
//! Wire shapes exchanged with the frame.
//!
//! Outbound envelopes are flat JSON objects: `{"type": "init", "secret": "..."}`.
//! Inbound envelopes carry their body under `payload`, because the `ready`
//! body has a `type` of its own:
//!
//! ```text
//! {"type": "ready", "payload": {"sessionId": "s1", "version": "1.0", "type": "add_on"}}
//! ```
//!
//! A flat inbound envelope is accepted too; the envelope minus its `type`
//! key is then the body.
//!
//! Each inbound kind maps to exactly one payload type:
//!
//! | kind                  | payload                |
//! |-----------------------|------------------------|
//! | `ready`               | [`ReadyPayload`]       |
//! | `session-updated`     | [`SessionData`]        |
//! | `allocations-updated` | [`AllocationsUpdate`]  |
//! | `resize`              | [`ResizePayload`]      |
//! | `error`               | [`RemoteError`]        |
//! | `destroyed`           | [`DestroyedPayload`]   |
//! | anything else         | raw envelope (`Custom`) |

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    event::EventKind,
    host::FrameSize,
    session::{allocations_total, Allocation, PreviewSessionConfig, SessionData, SessionType},
};

/// Commands sent to the frame.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Init { secret: Arc<SecretString> },
    PreviewInit { config: PreviewSessionConfig },
    Refresh,
    Destroy,
}

impl OutboundMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            OutboundMessage::Init { .. } => "init",
            OutboundMessage::PreviewInit { .. } => "preview-init",
            OutboundMessage::Refresh => "refresh",
            OutboundMessage::Destroy => "destroy",
        }
    }

    /// `init` and `preview-init` are the only commands allowed before readiness.
    pub fn is_init(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Init { .. } | OutboundMessage::PreviewInit { .. }
        )
    }

    /// Serialises the envelope. This is the only place the secret is exposed.
    pub fn to_envelope(&self) -> Value {
        match self {
            OutboundMessage::Init { secret } => json!({
                "type": self.message_type(),
                "secret": secret.expose_secret(),
            }),
            OutboundMessage::PreviewInit { config } => json!({
                "type": self.message_type(),
                "config": config,
            }),
            OutboundMessage::Refresh | OutboundMessage::Destroy => json!({
                "type": self.message_type(),
            }),
        }
    }
}

/// Body of `ready`. Every field is optional and decoded leniently: a value of
/// the wrong shape reads as `None` and never rejects the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    /// Absent for preview sessions until the remote assigns one.
    #[serde(default, deserialize_with = "lenient_text")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub version: Option<String>,
    /// `None` for session kinds this crate does not know yet.
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub session_type: Option<SessionType>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Strings pass through, numbers are rendered, anything else is `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationsUpdate {
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    pub total_amount: u64,
}

impl AllocationsUpdate {
    pub fn new(allocations: Vec<Allocation>) -> Self {
        let total_amount = allocations_total(&allocations);
        Self {
            allocations,
            total_amount,
        }
    }

    pub fn computed_total(&self) -> u64 {
        allocations_total(&self.allocations)
    }

    /// The delivered total must equal the sum of the amounts.
    pub fn is_consistent(&self) -> bool {
        self.total_amount == self.computed_total()
    }
}

/// A CSS length: bare numbers are pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dimension {
    Pixels(f64),
    Css(String),
}

impl Dimension {
    pub fn to_css(&self) -> String {
        match self {
            Dimension::Pixels(px) if px.fract() == 0.0 => format!("{}px", *px as i64),
            Dimension::Pixels(px) => format!("{}px", px),
            Dimension::Css(css) => css.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResizePayload {
    #[serde(default)]
    pub width: Option<Dimension>,
    #[serde(default)]
    pub height: Option<Dimension>,
}

impl ResizePayload {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize {
            width: self.width.as_ref().map(Dimension::to_css),
            height: self.height.as_ref().map(Dimension::to_css),
        }
    }
}

/// Advisory error reported by the remote widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyedPayload {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A validated notification from the frame. This is also what event bus
/// handlers receive.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Ready(ReadyPayload),
    SessionUpdated(SessionData),
    AllocationsUpdated(AllocationsUpdate),
    Resize(ResizePayload),
    Error(RemoteError),
    Destroyed(DestroyedPayload),
    /// Well-formed envelope of a kind this crate does not know, forwarded verbatim.
    Custom { kind: String, envelope: Value },
}

impl InboundMessage {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundMessage::Ready(_) => EventKind::Ready,
            InboundMessage::SessionUpdated(_) => EventKind::SessionUpdated,
            InboundMessage::AllocationsUpdated(_) => EventKind::AllocationsUpdated,
            InboundMessage::Resize(_) => EventKind::Resize,
            InboundMessage::Error(_) => EventKind::Error,
            InboundMessage::Destroyed(_) => EventKind::Destroyed,
            InboundMessage::Custom { kind, .. } => EventKind::Custom(kind.clone()),
        }
    }

    /// Decodes a structurally valid envelope (see [`super::validate`]).
    ///
    /// Fails when the body of a known kind does not match its payload type.
    pub fn from_envelope(message_type: &str, envelope: &Map<String, Value>) -> serde_json::Result<Self> {
        let kind: EventKind = message_type.into();
        let message = match kind {
            EventKind::Ready => InboundMessage::Ready(decode_payload(envelope)?),
            EventKind::SessionUpdated => InboundMessage::SessionUpdated(decode_payload(envelope)?),
            EventKind::AllocationsUpdated => {
                InboundMessage::AllocationsUpdated(decode_payload(envelope)?)
            }
            EventKind::Resize => InboundMessage::Resize(decode_payload(envelope)?),
            EventKind::Error => InboundMessage::Error(decode_payload(envelope)?),
            EventKind::Destroyed => InboundMessage::Destroyed(decode_payload(envelope)?),
            EventKind::Custom(kind) => InboundMessage::Custom {
                kind,
                envelope: Value::Object(envelope.clone()),
            },
        };
        Ok(message)
    }
}

fn decode_payload<T: for<'de> Deserialize<'de>>(envelope: &Map<String, Value>) -> serde_json::Result<T> {
    match envelope.get("payload") {
        Some(payload) => T::deserialize(payload),
        None => {
            let mut flat = envelope.clone();
            flat.remove("type");
            T::deserialize(Value::Object(flat))
        }
    }
}
