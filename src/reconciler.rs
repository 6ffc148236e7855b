//! Cached session state, updated from inbound notifications before they
//! reach the event bus.
//!
//! `session-updated` and `allocations-updated` are applied independently:
//! after an `allocations-updated`, [`Reconciler::allocations`] is fresh while
//! the allocations embedded in [`Reconciler::session_data`] still reflect the
//! last `session-updated`. That split is intended.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    message::InboundMessage,
    session::{allocations_total, Allocation, SessionData, SessionType},
    transport::Transport,
};

#[derive(Debug, Default, Clone)]
struct SessionCache {
    session_id: Option<String>,
    session_type: Option<SessionType>,
    session_data: Option<SessionData>,
    allocations: Vec<Allocation>,
    version: Option<String>,
    ready_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    cache: RwLock<SessionCache>,
}

impl Reconciler {
    /// Seeds the cache with what is known before the remote reports anything.
    pub fn new(
        session_id: Option<String>,
        session_type: Option<SessionType>,
        allocations: Vec<Allocation>,
    ) -> Self {
        Self {
            cache: RwLock::new(SessionCache {
                session_id,
                session_type,
                allocations,
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionCache> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionCache> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies the side effects of one inbound message.
    pub fn apply(&self, message: &InboundMessage, transport: &Transport) {
        match message {
            InboundMessage::Ready(ready) => {
                let mut cache = self.write();
                if let Some(id) = &ready.session_id {
                    cache.session_id = Some(id.clone());
                }
                if let Some(kind) = ready.session_type {
                    cache.session_type = Some(kind);
                }
                cache.version = ready.version.clone();
                cache.ready_at = Some(Utc::now());
            }
            InboundMessage::SessionUpdated(data) => {
                let mut cache = self.write();
                cache.allocations = data.allocations().to_vec();
                cache.session_type = Some(data.session_type());
                if let Some(id) = data.session_id() {
                    cache.session_id = Some(id.to_string());
                }
                cache.session_data = Some(data.clone());
                debug!(
                    session_type = %data.session_type(),
                    allocations = cache.allocations.len(),
                    "session data replaced"
                );
            }
            InboundMessage::AllocationsUpdated(update) => {
                if !update.is_consistent() {
                    warn!(
                        delivered = update.total_amount,
                        computed = update.computed_total(),
                        "allocation total does not match the sum of amounts"
                    );
                }
                self.write().allocations = update.allocations.clone();
            }
            InboundMessage::Resize(resize) => transport.resize(resize),
            InboundMessage::Error(_) | InboundMessage::Destroyed(_) | InboundMessage::Custom { .. } => {}
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.read().session_id.clone()
    }

    pub fn session_type(&self) -> Option<SessionType> {
        self.read().session_type
    }

    pub fn session_data(&self) -> Option<SessionData> {
        self.read().session_data.clone()
    }

    pub fn allocations(&self) -> Vec<Allocation> {
        self.read().allocations.clone()
    }

    pub fn total_amount(&self) -> u64 {
        allocations_total(&self.read().allocations)
    }

    /// Protocol version reported by the last `ready`.
    pub fn version(&self) -> Option<String> {
        self.read().version.clone()
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.read().ready_at
    }
}
