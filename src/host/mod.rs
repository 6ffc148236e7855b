//! # Frame host
//!
//! The document, the embedded frame element and the page-wide `message`
//! channel live outside this crate. Everything the transport needs from them
//! goes through [`FrameHost`]:
//!
//! ```text
//! ┌───────────┐ create_frame / post_message ┌───────────┐
//! │ Transport │────────────────────────────▶│ FrameHost │──▶ frame (remote widget)
//! └─────▲─────┘                             └─────┬─────┘
//!       │        HostEvent (load, message)        │
//!       └─────────────────────────────────────────┘
//! ```
//!
//! Inbound traffic arrives as [`HostEvent`]s on a channel the transport
//! registers with [`FrameHost::add_listener`]. The registration is owned by a
//! [`Subscription`] and detached when it is disposed or dropped, so one live
//! transport never holds more than one listener.
//!
//! [`InMemoryHost`] is a complete in-process implementation.

use std::sync::Arc;

use mockall::automock;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod memory;

pub use memory::{FrameRecord, InMemoryHost, PostedMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// Identity of a frame's content window, compared against a message's `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Where to mount: an element identifier or a handle the caller already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountTarget {
    Id(String),
    Handle(ContainerId),
}

impl MountTarget {
    pub fn id(id: impl Into<String>) -> Self {
        MountTarget::Id(id.into())
    }
}

impl std::fmt::Display for MountTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountTarget::Id(id) => write!(f, "#{}", id),
            MountTarget::Handle(handle) => write!(f, "container({})", handle.0),
        }
    }
}

impl From<&str> for MountTarget {
    fn from(id: &str) -> Self {
        MountTarget::Id(id.to_string())
    }
}

impl From<String> for MountTarget {
    fn from(id: String) -> Self {
        MountTarget::Id(id)
    }
}

impl From<ContainerId> for MountTarget {
    fn from(handle: ContainerId) -> Self {
        MountTarget::Handle(handle)
    }
}

/// Attributes of the frame element to create.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub src: Url,
    pub title: String,
    pub width: String,
    pub height: String,
    pub allow: String,
}

impl FrameSpec {
    pub fn new(src: Url) -> Self {
        Self {
            src,
            title: "Embedded widget".to_string(),
            width: "100%".to_string(),
            height: "600px".to_string(),
            allow: "payment".to_string(),
        }
    }
}

/// CSS dimensions to apply to the frame; `None` leaves that side unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameSize {
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountedFrame {
    pub frame: FrameId,
    pub content_window: WindowId,
}

/// Something delivered by the host's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    FrameLoaded {
        frame: FrameId,
    },
    /// A cross-origin message. `data` is untrusted.
    Message {
        source: Option<WindowId>,
        origin: String,
        data: Value,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Frame creation failed: {message}")]
    FrameCreation { message: String },

    #[error("postMessage failed: {message}")]
    PostMessage { message: String },

    #[error("Frame is detached: {frame:?}")]
    Detached { frame: FrameId },
}

#[automock]
pub trait FrameHost: Send + Sync {
    fn resolve_container(&self, target: &MountTarget) -> Option<ContainerId>;

    fn create_frame(
        &self,
        container: ContainerId,
        spec: &FrameSpec,
    ) -> Result<MountedFrame, HostError>;

    fn add_listener(&self, sender: mpsc::UnboundedSender<HostEvent>) -> ListenerId;

    fn remove_listener(&self, listener: ListenerId);

    fn post_message(
        &self,
        window: WindowId,
        message: &Value,
        target_origin: &str,
    ) -> Result<(), HostError>;

    fn set_frame_size(&self, frame: FrameId, size: &FrameSize);

    fn remove_frame(&self, frame: FrameId);
}

/// Owned registration of one inbound listener.
pub struct Subscription {
    host: Arc<dyn FrameHost>,
    listener: Option<ListenerId>,
}

impl Subscription {
    /// Registers a fresh listener and returns the handle plus its receiving end.
    pub fn listen(host: Arc<dyn FrameHost>) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = host.add_listener(tx);
        (
            Self {
                host,
                listener: Some(listener),
            },
            rx,
        )
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.listener
    }

    /// Detaches the listener. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.host.remove_listener(listener);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("listener", &self.listener)
            .finish()
    }
}
