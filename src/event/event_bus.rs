//! # Event Bus Implementation
//!
//! Per-widget publish-subscribe hub. Validated inbound notifications are
//! republished here after the session cache has been updated.
//!
//! ## Features
//!
//! - **Synchronous dispatch**: [`EventBus::emit`] runs every handler for the
//!   event before returning, in registration order
//! - **Failure isolation**: a handler that returns `Err` or panics is logged
//!   and skipped; its siblings still run and the emitter never sees the error
//! - **Set semantics**: registering the same [`Handler`] twice is a no-op
//! - **Single-occurrence waits**: [`EventBus::wait_for`] resolves with the
//!   next matching event or fails with `Timeout`
//!
//! ## Wait lifecycle
//!
//! `wait_for` registers its temporary handler immediately, before the returned
//! future is first polled, so an event emitted between the call and the first
//! `.await` is not lost. The handler is removed when the future completes,
//! times out or is dropped.
//!
//! Handlers survive `destroy()` of the owning widget; callers do not
//! re-subscribe after a remount.

use std::{
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::event_registry::{Handler, HandlerRegistry, HandlerResult};
use super::EventKind;
use crate::{config::DEFAULT_TIMEOUT, message::InboundMessage, WidgetError, WidgetResult};

pub struct EventBus {
    registry: HandlerRegistry,
    default_timeout: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl EventBus {
    /// Creates a bus whose `wait_for` calls default to `default_timeout`.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            default_timeout,
        }
    }

    /// Adds `handler` for `kind` unless it is already registered there.
    pub fn on(&self, kind: impl Into<EventKind>, handler: &Handler) -> &Self {
        let kind = kind.into();
        if !self.registry.insert(kind.clone(), handler.clone()) {
            trace!(%kind, "handler already registered");
        }
        self
    }

    /// Removes one handler, or all handlers for `kind` when `handler` is `None`.
    pub fn off(&self, kind: impl Into<EventKind>, handler: Option<&Handler>) -> &Self {
        let kind = kind.into();
        let removed = self.registry.remove(&kind, handler);
        trace!(%kind, removed, "handlers removed");
        self
    }

    /// Runs every handler registered for the message's kind, in order.
    pub fn emit(&self, message: &InboundMessage) {
        let kind = message.kind();
        let handlers = self.registry.snapshot(&kind);
        debug!(%kind, handlers = handlers.len(), "Emitting event");

        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%kind, index, error = %e, "event handler failed"),
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    warn!(%kind, index, %reason, "event handler panicked");
                }
            }
        }
    }

    /// Waits for the next `kind` event. `None` uses the bus default timeout.
    ///
    /// Fails with [`WidgetError::Timeout`] when nothing arrives in time, or
    /// [`WidgetError::Cancelled`] when the waiter is removed with `off(kind, None)`.
    pub fn wait_for(
        &self,
        kind: impl Into<EventKind>,
        timeout: Option<Duration>,
    ) -> impl Future<Output = WidgetResult<InboundMessage>> + Send + 'static {
        let kind = kind.into();
        let timeout = timeout.unwrap_or(self.default_timeout);

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let waiter: Handler = Arc::new(move |message: &InboundMessage| {
            let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(sender) = sender {
                let _ = sender.send(message.clone());
            }
            Ok(())
        });
        self.registry.insert(kind.clone(), waiter.clone());

        // Only the registry keeps the handler alive, so `off(kind, None)` drops
        // the sender and ends the wait.
        let guard = WaiterGuard {
            registry: self.registry.clone(),
            kind: kind.clone(),
            handler: Arc::downgrade(&waiter),
        };
        drop(waiter);

        async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(message)) => Ok(message),
                Ok(Err(_)) => Err(WidgetError::cancelled(format!("wait for {}", kind))),
                Err(_) => {
                    debug!(%kind, ?timeout, "wait timed out");
                    Err(WidgetError::timeout(kind.to_string(), timeout))
                }
            }
        }
    }

    pub fn handler_count(&self, kind: impl Into<EventKind>) -> usize {
        self.registry.count(&kind.into())
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

/// Deregisters a `wait_for` handler on every exit path.
struct WaiterGuard {
    registry: HandlerRegistry,
    kind: EventKind,
    handler: Weak<dyn Fn(&InboundMessage) -> HandlerResult + Send + Sync>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.upgrade() {
            self.registry.remove(&self.kind, Some(&handler));
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
