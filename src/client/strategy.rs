//! Live vs. preview behaviour behind one small capability trait.

use url::Url;

use crate::{
    message::OutboundMessage,
    session::{Allocation, PreviewSessionConfig, SessionDescriptor, SessionType, StyleMode},
};

/// What differs between the two widget variants. Everything else about the
/// lifecycle is shared by [`super::Widget`].
pub trait SessionOrigin: Send + Sync {
    /// Frame address: the base address plus this variant's query parameters.
    fn build_address(&self, base: &Url) -> Url;

    /// Envelope posted after the frame loads.
    fn build_init_envelope(&self) -> OutboundMessage;

    /// Known before `ready` for live sessions only.
    fn session_id(&self) -> Option<String>;

    fn session_type(&self) -> Option<SessionType>;

    /// Allocations known before the remote reports any.
    fn initial_allocations(&self) -> Vec<Allocation> {
        Vec::new()
    }

    /// Whether `refresh` has a backend of record to ask.
    fn supports_refresh(&self) -> bool;

    fn kind(&self) -> &'static str;
}

fn with_style_mode(address: &mut Url, style_mode: Option<StyleMode>) {
    if let Some(mode) = style_mode {
        address
            .query_pairs_mut()
            .append_pair("styleMode", &mode.to_string());
    }
}

/// A session backed by the remote API, authenticated by its secret.
pub struct LiveSession {
    descriptor: SessionDescriptor,
}

impl LiveSession {
    pub fn new(descriptor: SessionDescriptor) -> Self {
        Self { descriptor }
    }
}

impl SessionOrigin for LiveSession {
    fn build_address(&self, base: &Url) -> Url {
        let mut address = base.clone();
        address
            .query_pairs_mut()
            .append_pair("sessionId", self.descriptor.session_id());
        with_style_mode(&mut address, self.descriptor.style_mode());
        address
    }

    fn build_init_envelope(&self) -> OutboundMessage {
        OutboundMessage::Init {
            secret: self.descriptor.secret().clone(),
        }
    }

    fn session_id(&self) -> Option<String> {
        Some(self.descriptor.session_id().to_string())
    }

    fn session_type(&self) -> Option<SessionType> {
        None
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "live"
    }
}

/// A demo session that lives entirely in the frame. No secret, no backend.
pub struct PreviewSession {
    config: PreviewSessionConfig,
}

impl PreviewSession {
    pub fn new(config: PreviewSessionConfig) -> Self {
        Self { config }
    }
}

impl SessionOrigin for PreviewSession {
    fn build_address(&self, base: &Url) -> Url {
        let mut address = base.clone();
        address.query_pairs_mut().append_pair("preview", "true");
        with_style_mode(&mut address, self.config.style_mode);
        address
    }

    fn build_init_envelope(&self) -> OutboundMessage {
        OutboundMessage::PreviewInit {
            config: self.config.clone(),
        }
    }

    // 識別子は ready で初めて分かる
    fn session_id(&self) -> Option<String> {
        None
    }

    fn session_type(&self) -> Option<SessionType> {
        Some(self.config.session_type())
    }

    fn initial_allocations(&self) -> Vec<Allocation> {
        self.config.allocations().to_vec()
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    fn kind(&self) -> &'static str {
        "preview"
    }
}
