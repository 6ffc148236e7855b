//! # Widget client
//!
//! The public handle callers hold. One state machine serves both live and
//! preview sessions; the differences live behind [`SessionOrigin`].
//!
//! ```text
//!              mount()               ready
//! Unmounted ───────────▶ Mounting ───────────▶ Ready
//!     ▲                   │   ▲                  │
//!     │ mount error       │   └──── mount() ─────┘
//!     └───────────────────┘
//!          destroy() from any state ──▶ Destroyed ── mount() ──▶ Mounting
//! ```
//!
//! `mount()` resolves on the first `ready` after the frame is created. A
//! second `mount()` or a `destroy()` while mounting ends the pending call
//! with `Cancelled`. A `Timeout` leaves the frame in place, so a late `ready`
//! still brings the widget to `Ready`.
//!
//! Handlers registered with [`Widget::on`] survive `destroy()` and remounts.

pub mod strategy;

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

pub use strategy::{LiveSession, PreviewSession, SessionOrigin};

use crate::{
    config::{widget_base_url, WidgetConfig},
    event::{EventBus, EventKind, Handler},
    host::{FrameHost, MountTarget},
    message::{InboundMessage, OutboundMessage},
    reconciler::Reconciler,
    session::{Allocation, PreviewSessionConfig, SessionData, SessionDescriptor, SessionType},
    transport::{InboundSink, Transport},
    WidgetError, WidgetResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum WidgetState {
    Unmounted,
    Mounting,
    Ready,
    Destroyed,
}

struct Lifecycle {
    state: WidgetState,
    attempt: u64,
    cancel: Option<oneshot::Sender<()>>,
}

struct ClientCore {
    origin: Box<dyn SessionOrigin>,
    base: Url,
    transport: Transport,
    bus: EventBus,
    reconciler: Reconciler,
    config: WidgetConfig,
    instance: Uuid,
    lifecycle: Mutex<Lifecycle>,
}

impl ClientCore {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Clears the cancel handle if `attempt` is still the latest mount.
    fn finish_attempt(&self, attempt: u64, failed: bool) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.attempt != attempt {
            return;
        }
        lifecycle.cancel = None;
        if failed && lifecycle.state == WidgetState::Mounting && !self.transport.is_mounted() {
            lifecycle.state = WidgetState::Unmounted;
        }
    }
}

impl InboundSink for ClientCore {
    fn deliver(&self, message: InboundMessage) {
        self.reconciler.apply(&message, &self.transport);
        if matches!(message, InboundMessage::Ready(_)) && self.transport.is_ready() {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != WidgetState::Destroyed {
                lifecycle.state = WidgetState::Ready;
            }
        }
        self.bus.emit(&message);
    }
}

impl ClientCore {
    /// Waits for a `ready` that the transport has accepted for the current
    /// frame. A `ready` from a frame replaced in the meantime is skipped.
    async fn ready_for_current_frame(&self) -> WidgetResult<()> {
        let timeout = self.config.default_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(WidgetError::timeout(EventKind::Ready.to_string(), timeout));
            }
            let next = self.bus.wait_for(EventKind::Ready, Some(remaining));
            if self.transport.is_ready() {
                return Ok(());
            }
            match next.await {
                Ok(_) if self.transport.is_ready() => return Ok(()),
                Ok(_) => debug!("ignoring ready from a replaced frame"),
                Err(WidgetError::Timeout { .. }) => {
                    return Err(WidgetError::timeout(EventKind::Ready.to_string(), timeout))
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Handle to one embedded widget. Cheap to clone; all clones drive the same
/// frame. The frame is torn down when the last clone is dropped.
#[derive(Clone)]
pub struct Widget {
    core: Arc<ClientCore>,
}

/// Creates a live widget with the default configuration.
pub fn create_widget(host: Arc<dyn FrameHost>, descriptor: SessionDescriptor) -> WidgetResult<Widget> {
    create_widget_with_config(host, descriptor, WidgetConfig::default())
}

/// Fails with `InvalidConfig` on a blank session id or secret.
pub fn create_widget_with_config(
    host: Arc<dyn FrameHost>,
    descriptor: SessionDescriptor,
    config: WidgetConfig,
) -> WidgetResult<Widget> {
    descriptor.validate()?;
    Widget::new(host, Box::new(LiveSession::new(descriptor)), config)
}

/// Creates a backend-less preview widget with the default configuration.
pub fn create_preview_widget(
    host: Arc<dyn FrameHost>,
    config: PreviewSessionConfig,
) -> WidgetResult<Widget> {
    create_preview_widget_with_config(host, config, WidgetConfig::default())
}

pub fn create_preview_widget_with_config(
    host: Arc<dyn FrameHost>,
    preview: PreviewSessionConfig,
    config: WidgetConfig,
) -> WidgetResult<Widget> {
    preview.validate()?;
    Widget::new(host, Box::new(PreviewSession::new(preview)), config)
}

impl Widget {
    fn new(
        host: Arc<dyn FrameHost>,
        origin: Box<dyn SessionOrigin>,
        config: WidgetConfig,
    ) -> WidgetResult<Self> {
        config.validate()?;
        let base = widget_base_url()?;
        let transport = Transport::new(host, &base, config.clone())?;
        let reconciler = Reconciler::new(
            origin.session_id(),
            origin.session_type(),
            origin.initial_allocations(),
        );
        let instance = Uuid::new_v4();
        debug!(%instance, kind = origin.kind(), "widget created");

        Ok(Self {
            core: Arc::new(ClientCore {
                origin,
                base,
                transport,
                bus: EventBus::new(config.default_timeout),
                reconciler,
                config,
                instance,
                lifecycle: Mutex::new(Lifecycle {
                    state: WidgetState::Unmounted,
                    attempt: 0,
                    cancel: None,
                }),
            }),
        })
    }

    /// Creates the frame inside `target` and resolves once the remote reports `ready`.
    ///
    /// Errors: `ContainerNotFound`, `MountFailed`, `Timeout` after the default
    /// timeout, `Cancelled` when superseded by another `mount()` or `destroy()`.
    #[instrument(skip(self, target), fields(widget = %self.core.instance, kind = self.core.origin.kind()))]
    pub async fn mount(&self, target: impl Into<MountTarget>) -> WidgetResult<()> {
        let core = &self.core;
        let target = target.into();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let attempt = {
            let mut lifecycle = core.lifecycle();
            if let Some(previous) = lifecycle.cancel.replace(cancel_tx) {
                debug!("superseding previous mount attempt");
                let _ = previous.send(());
            }
            lifecycle.attempt += 1;
            lifecycle.state = WidgetState::Mounting;
            lifecycle.attempt
        };

        let address = core.origin.build_address(&core.base);
        let sink: Arc<dyn InboundSink> = core.clone();
        if let Err(e) = core.transport.mount(
            &target,
            address,
            core.origin.build_init_envelope(),
            Arc::downgrade(&sink),
        ) {
            warn!(error = %e, "mount failed");
            core.finish_attempt(attempt, true);
            return Err(e);
        }

        // Readiness is checked against the transport after every wakeup, so a
        // ready that lands before the wait is registered is not missed.
        let result = tokio::select! {
            result = core.ready_for_current_frame() => result,
            _ = cancel_rx => Err(WidgetError::cancelled("mount")),
        };
        match &result {
            Ok(()) => debug!("widget ready"),
            Err(WidgetError::Timeout { .. }) => {
                warn!(timeout_ms = core.config.default_timeout.as_millis() as u64, "no ready from widget")
            }
            Err(e) => debug!(error = %e, "mount ended early"),
        }
        core.finish_attempt(attempt, result.is_err());
        result
    }

    /// Tears the widget down. Never fails; calling it twice is harmless.
    #[instrument(skip(self), fields(widget = %self.core.instance))]
    pub fn destroy(&self) {
        {
            let mut lifecycle = self.core.lifecycle();
            if let Some(cancel) = lifecycle.cancel.take() {
                let _ = cancel.send(());
            }
            lifecycle.attempt += 1;
            lifecycle.state = WidgetState::Destroyed;
        }
        self.core.transport.destroy();
    }

    /// Asks the backend for fresh session data and waits for the next
    /// `session-updated`. Preview widgets have no backend: this returns at
    /// once and sends nothing.
    #[instrument(skip(self), fields(widget = %self.core.instance))]
    pub async fn refresh(&self) -> WidgetResult<()> {
        let core = &self.core;
        if !core.origin.supports_refresh() {
            debug!("refresh is a no-op for preview sessions");
            return Ok(());
        }
        let updated = core
            .bus
            .wait_for(EventKind::SessionUpdated, Some(core.config.default_timeout));
        core.transport.send(OutboundMessage::Refresh);
        updated.await.map(|_| ())
    }

    pub fn on(&self, kind: impl Into<EventKind>, handler: &Handler) -> &Self {
        self.core.bus.on(kind, handler);
        self
    }

    pub fn off(&self, kind: impl Into<EventKind>, handler: Option<&Handler>) -> &Self {
        self.core.bus.off(kind, handler);
        self
    }

    /// Next `kind` event. `None` uses the configured default timeout.
    ///
    /// The wait is registered when this is called, not when the future is
    /// first polled.
    pub fn wait_for(
        &self,
        kind: impl Into<EventKind>,
        timeout: Option<Duration>,
    ) -> impl Future<Output = WidgetResult<InboundMessage>> + Send + 'static {
        self.core.bus.wait_for(kind, timeout)
    }

    pub fn is_ready(&self) -> bool {
        self.core.transport.is_ready()
    }

    pub fn get_session_id(&self) -> Option<String> {
        self.core.reconciler.session_id()
    }

    pub fn get_session_data(&self) -> Option<SessionData> {
        self.core.reconciler.session_data()
    }

    /// Allocations from the most recent `session-updated` or `allocations-updated`.
    pub fn get_allocations(&self) -> Vec<Allocation> {
        self.core.reconciler.allocations()
    }

    pub fn get_type(&self) -> Option<SessionType> {
        self.core.reconciler.session_type()
    }

    /// Protocol version the remote reported in its last `ready`.
    pub fn get_version(&self) -> Option<String> {
        self.core.reconciler.version()
    }

    /// When the last accepted `ready` arrived.
    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.core.reconciler.ready_at()
    }

    pub fn total_amount(&self) -> u64 {
        self.core.reconciler.total_amount()
    }

    pub fn state(&self) -> WidgetState {
        self.core.lifecycle().state
    }

    pub fn target_origin(&self) -> &str {
        self.core.transport.target_origin()
    }

    /// Address of the mounted frame, if any.
    pub fn frame_address(&self) -> Option<Url> {
        self.core.transport.address()
    }

    /// Commands waiting for `ready`.
    pub fn pending_len(&self) -> usize {
        self.core.transport.pending_len()
    }

    pub fn instance_id(&self) -> Uuid {
        self.core.instance
    }
}

impl std::fmt::Debug for Widget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Widget")
            .field("instance", &self.core.instance)
            .field("kind", &self.core.origin.kind())
            .field("state", &self.state())
            .finish()
    }
}
