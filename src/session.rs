//! # Session model
//!
//! Types describing one widget mount and the campaign/allocation data the
//! remote widget reports for it.
//!
//! - [`SessionDescriptor`]: caller-supplied identity + credential of a live session
//! - [`PreviewSessionConfig`]: backend-less demo session, carried whole to the remote
//! - [`SessionData`]: the remote's authoritative view, one of three session kinds
//! - [`Allocation`]: an amount in integer cents attributed to one campaign
//!
//! Amounts are always integer cents. Session data and preview configs use the
//! remote API's snake_case field names.

use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{WidgetError, WidgetResult};

/// Session kind discriminant shared by [`SessionData`], preview configs and `ready`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionType {
    /// Non-interactive, preset allocations.
    PortionOfSales,
    /// Interactive, payer picks the recipient.
    Choice,
    /// Interactive, payer funds and picks.
    AddOn,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StyleMode {
    #[default]
    Gradient,
    Solid,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub campaign_identifier: String,
    /// Integer cents.
    pub amount: u64,
}

impl Allocation {
    pub fn new(campaign_identifier: impl Into<String>, amount: u64) -> Self {
        Self {
            campaign_identifier: campaign_identifier.into(),
            amount,
        }
    }
}

/// Sum of allocation amounts, saturating instead of wrapping.
pub fn allocations_total(allocations: &[Allocation]) -> u64 {
    allocations
        .iter()
        .fold(0u64, |acc, a| acc.saturating_add(a.amount))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Preset-allocation session (`portion_of_sales`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresetSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Interactive session (`choice` and `add_on`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InteractiveSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default)]
    pub available_campaigns: Vec<Campaign>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The remote widget's view of one session. Replaced wholesale on every
/// `session-updated`; callers only ever see it by shared reference or clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionData {
    PortionOfSales(PresetSession),
    Choice(InteractiveSession),
    AddOn(InteractiveSession),
}

impl SessionData {
    pub fn session_type(&self) -> SessionType {
        match self {
            SessionData::PortionOfSales(_) => SessionType::PortionOfSales,
            SessionData::Choice(_) => SessionType::Choice,
            SessionData::AddOn(_) => SessionType::AddOn,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionData::PortionOfSales(s) => s.session_id.as_deref(),
            SessionData::Choice(s) | SessionData::AddOn(s) => s.session_id.as_deref(),
        }
    }

    pub fn allocations(&self) -> &[Allocation] {
        match self {
            SessionData::PortionOfSales(s) => &s.allocations,
            SessionData::Choice(s) | SessionData::AddOn(s) => &s.allocations,
        }
    }
}

/// Identity and credential of a live session.
///
/// The secret is held as a [`SecretString`] and only exposed when the `init`
/// envelope is serialised for the frame.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    session_id: String,
    secret: Arc<SecretString>,
    style_mode: Option<StyleMode>,
}

impl SessionDescriptor {
    pub fn new(session_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            secret: Arc::new(SecretString::from(secret.into())),
            style_mode: None,
        }
    }

    pub fn with_style_mode(mut self, style_mode: StyleMode) -> Self {
        self.style_mode = Some(style_mode);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn style_mode(&self) -> Option<StyleMode> {
        self.style_mode
    }

    pub(crate) fn secret(&self) -> &Arc<SecretString> {
        &self.secret
    }

    /// Blank or whitespace-only values are rejected.
    pub fn validate(&self) -> WidgetResult<()> {
        use secrecy::ExposeSecret;

        if self.session_id.trim().is_empty() {
            return Err(WidgetError::invalid_config("sessionId must not be blank"));
        }
        if self.secret.expose_secret().trim().is_empty() {
            return Err(WidgetError::invalid_config("secret must not be blank"));
        }
        Ok(())
    }
}

/// Shape of a preview session, matching the [`SessionData`] discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreviewKind {
    PortionOfSales {
        allocations: Vec<Allocation>,
    },
    Choice {
        amount: u64,
        available_campaigns: Vec<String>,
    },
    AddOn {
        amount: u64,
        available_campaigns: Vec<String>,
    },
}

/// Client-only session used for demos. Carries no secret and is sent whole
/// to the frame in the `preview-init` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSessionConfig {
    #[serde(flatten)]
    pub kind: PreviewKind,
    /// Goes into the frame address, not into the envelope.
    #[serde(
        default,
        rename = "styleMode",
        alias = "style_mode",
        skip_serializing
    )]
    pub style_mode: Option<StyleMode>,
}

impl PreviewSessionConfig {
    pub fn portion_of_sales(allocations: Vec<Allocation>) -> Self {
        Self {
            kind: PreviewKind::PortionOfSales { allocations },
            style_mode: None,
        }
    }

    pub fn choice(amount: u64, available_campaigns: Vec<String>) -> Self {
        Self {
            kind: PreviewKind::Choice {
                amount,
                available_campaigns,
            },
            style_mode: None,
        }
    }

    pub fn add_on(amount: u64, available_campaigns: Vec<String>) -> Self {
        Self {
            kind: PreviewKind::AddOn {
                amount,
                available_campaigns,
            },
            style_mode: None,
        }
    }

    pub fn with_style_mode(mut self, style_mode: StyleMode) -> Self {
        self.style_mode = Some(style_mode);
        self
    }

    pub fn session_type(&self) -> SessionType {
        match &self.kind {
            PreviewKind::PortionOfSales { .. } => SessionType::PortionOfSales,
            PreviewKind::Choice { .. } => SessionType::Choice,
            PreviewKind::AddOn { .. } => SessionType::AddOn,
        }
    }

    /// Preset allocations, or empty for interactive previews.
    pub fn allocations(&self) -> &[Allocation] {
        match &self.kind {
            PreviewKind::PortionOfSales { allocations } => allocations,
            _ => &[],
        }
    }

    pub fn validate(&self) -> WidgetResult<()> {
        match &self.kind {
            PreviewKind::PortionOfSales { allocations } => {
                if allocations.is_empty() {
                    return Err(WidgetError::invalid_config(
                        "portion_of_sales preview needs at least one allocation",
                    ));
                }
                if allocations
                    .iter()
                    .any(|a| a.campaign_identifier.trim().is_empty())
                {
                    return Err(WidgetError::invalid_config(
                        "allocation campaign_identifier must not be blank",
                    ));
                }
            }
            PreviewKind::Choice {
                amount,
                available_campaigns,
            }
            | PreviewKind::AddOn {
                amount,
                available_campaigns,
            } => {
                if *amount == 0 {
                    return Err(WidgetError::invalid_config(
                        "preview amount must be positive",
                    ));
                }
                if available_campaigns.is_empty() {
                    return Err(WidgetError::invalid_config(
                        "available_campaigns must not be empty",
                    ));
                }
                if available_campaigns.iter().any(|c| c.trim().is_empty()) {
                    return Err(WidgetError::invalid_config(
                        "available_campaigns entries must not be blank",
                    ));
                }
            }
        }
        Ok(())
    }
}
