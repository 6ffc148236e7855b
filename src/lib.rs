//! Host-side bridge for an embedded, cross-origin payment widget.
//!
//! A [`Widget`] mounts one frame through a [`FrameHost`], posts the session
//! credential once the frame loads, queues commands until the frame reports
//! `ready`, and keeps a cached copy of the session's campaigns and
//! allocations up to date from the frame's notifications.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod message;
pub mod reconciler;
pub mod session;
pub mod transport;

// Re-exports
pub use client::{
    create_preview_widget, create_preview_widget_with_config, create_widget,
    create_widget_with_config, Widget, WidgetState,
};
pub use config::{WidgetConfig, DEFAULT_TIMEOUT};
pub use error::*;
pub use event::{handler, EventKind, Handler};
pub use host::{FrameHost, InMemoryHost, MountTarget};
pub use message::InboundMessage;
pub use session::*;

#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    // テスト前に一度だけ tracing を初期化
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
