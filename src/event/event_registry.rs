use std::{fmt, str::FromStr, sync::Arc};

use dashmap::DashMap;

use crate::message::InboundMessage;

/// Notification kinds handlers can subscribe to. Parses from and displays as
/// the wire name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Ready,
    SessionUpdated,
    AllocationsUpdated,
    Resize,
    Error,
    Destroyed,
    Custom(String), // 未知の種類もそのまま流す
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Ready => "ready",
            EventKind::SessionUpdated => "session-updated",
            EventKind::AllocationsUpdated => "allocations-updated",
            EventKind::Resize => "resize",
            EventKind::Error => "error",
            EventKind::Destroyed => "destroyed",
            EventKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "ready" => EventKind::Ready,
            "session-updated" => EventKind::SessionUpdated,
            "allocations-updated" => EventKind::AllocationsUpdated,
            "resize" => EventKind::Resize,
            "error" => EventKind::Error,
            "destroyed" => EventKind::Destroyed,
            other => EventKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        EventKind::from(name.as_str())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EventKind::from(s))
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

/// A subscriber callback. Identity is the `Arc` allocation: clone the same
/// `Handler` to register or remove it again.
pub type Handler = Arc<dyn Fn(&InboundMessage) -> HandlerResult + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&InboundMessage) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Event name → ordered, duplicate-free handler list.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<EventKind, Vec<Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the handler was already registered for `kind`.
    pub fn insert(&self, kind: EventKind, handler: Handler) -> bool {
        let mut entry = self.handlers.entry(kind).or_default();
        if entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        entry.push(handler);
        true
    }

    /// Removes one handler, or every handler for `kind` when `handler` is `None`.
    /// Returns how many were removed.
    pub fn remove(&self, kind: &EventKind, handler: Option<&Handler>) -> usize {
        match handler {
            None => self
                .handlers
                .remove(kind)
                .map(|(_, removed)| removed.len())
                .unwrap_or(0),
            Some(handler) => {
                let Some(mut entry) = self.handlers.get_mut(kind) else {
                    return 0;
                };
                let before = entry.len();
                entry.retain(|h| !Arc::ptr_eq(h, handler));
                let removed = before - entry.len();
                let now_empty = entry.is_empty();
                drop(entry);
                if now_empty {
                    self.handlers.remove_if(kind, |_, v| v.is_empty());
                }
                removed
            }
        }
    }

    /// Copy of the handler list, so callbacks run without holding a shard lock.
    pub fn snapshot(&self, kind: &EventKind) -> Vec<Handler> {
        self.handlers
            .get(kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: &EventKind) -> usize {
        self.handlers.get(kind).map(|e| e.len()).unwrap_or(0)
    }
}
