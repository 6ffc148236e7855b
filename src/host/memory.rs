//! In-process [`FrameHost`] that records everything the transport does.
//!
//! Containers are registered up front, frames are plain records, and inbound
//! traffic is injected with [`InMemoryHost::deliver`] or
//! [`InMemoryHost::deliver_from_frame`], which fan out to every attached
//! listener just like the page-wide message channel does.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{
    ContainerId, FrameHost, FrameId, FrameSize, FrameSpec, HostError, HostEvent, ListenerId,
    MountTarget, MountedFrame, WindowId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub frame: FrameId,
    pub container: ContainerId,
    pub content_window: WindowId,
    pub spec: FrameSpec,
    pub width: String,
    pub height: String,
    pub attached: bool,
}

impl FrameRecord {
    /// Origin the frame's document would report on its messages.
    pub fn origin(&self) -> String {
        self.spec.src.origin().ascii_serialization()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub window: WindowId,
    pub target_origin: String,
    pub message: Value,
}

impl PostedMessage {
    pub fn message_type(&self) -> Option<&str> {
        self.message.get("type").and_then(Value::as_str)
    }
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    containers: BTreeMap<String, ContainerId>,
    frames: BTreeMap<FrameId, FrameRecord>,
    listeners: HashMap<ListenerId, mpsc::UnboundedSender<HostEvent>>,
    posted: Vec<PostedMessage>,
    fail_frame_creation: Option<String>,
}

impl HostState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
    auto_load: bool,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `FrameLoaded` as soon as a frame is created.
    pub fn with_auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }

    pub fn with_container(self, id: &str) -> Self {
        self.add_container(id);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_container(&self, id: &str) -> ContainerId {
        let mut state = self.lock();
        if let Some(existing) = state.containers.get(id) {
            return *existing;
        }
        let container = ContainerId(state.next());
        state.containers.insert(id.to_string(), container);
        container
    }

    /// Make the next `create_frame` calls fail with the given message.
    pub fn fail_frame_creation(&self, message: Option<&str>) {
        self.lock().fail_frame_creation = message.map(str::to_string);
    }

    /// Fan an event out to every attached listener. Closed listeners are pruned.
    pub fn dispatch(&self, event: HostEvent) {
        let mut state = self.lock();
        state
            .listeners
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    pub fn fire_load(&self, frame: FrameId) {
        self.dispatch(HostEvent::FrameLoaded { frame });
    }

    pub fn deliver(&self, source: Option<WindowId>, origin: &str, data: Value) {
        self.dispatch(HostEvent::Message {
            source,
            origin: origin.to_string(),
            data,
        });
    }

    /// Deliver `data` as if posted by the frame's own document.
    pub fn deliver_from_frame(&self, frame: FrameId, data: Value) -> Result<(), HostError> {
        let (window, origin) = {
            let state = self.lock();
            let record = state.frames.get(&frame).ok_or(HostError::Detached { frame })?;
            (record.content_window, record.origin())
        };
        self.deliver(Some(window), &origin, data);
        Ok(())
    }

    pub fn posted(&self) -> Vec<PostedMessage> {
        self.lock().posted.clone()
    }

    pub fn posted_types(&self) -> Vec<String> {
        self.lock()
            .posted
            .iter()
            .filter_map(|p| p.message_type().map(str::to_string))
            .collect()
    }

    pub fn clear_posted(&self) {
        self.lock().posted.clear();
    }

    pub fn frame(&self, frame: FrameId) -> Option<FrameRecord> {
        self.lock().frames.get(&frame).cloned()
    }

    /// Most recently created frame that is still attached.
    pub fn current_frame(&self) -> Option<FrameRecord> {
        self.lock()
            .frames
            .values()
            .rev()
            .find(|f| f.attached)
            .cloned()
    }

    pub fn attached_frames(&self) -> usize {
        self.lock().frames.values().filter(|f| f.attached).count()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl FrameHost for InMemoryHost {
    fn resolve_container(&self, target: &MountTarget) -> Option<ContainerId> {
        let state = self.lock();
        match target {
            MountTarget::Id(id) => state.containers.get(id).copied(),
            MountTarget::Handle(handle) => state
                .containers
                .values()
                .find(|c| *c == handle)
                .copied(),
        }
    }

    fn create_frame(
        &self,
        container: ContainerId,
        spec: &FrameSpec,
    ) -> Result<MountedFrame, HostError> {
        let mounted = {
            let mut state = self.lock();
            if let Some(message) = &state.fail_frame_creation {
                return Err(HostError::FrameCreation {
                    message: message.clone(),
                });
            }
            let frame = FrameId(state.next());
            let content_window = WindowId(state.next());
            state.frames.insert(
                frame,
                FrameRecord {
                    frame,
                    container,
                    content_window,
                    spec: spec.clone(),
                    width: spec.width.clone(),
                    height: spec.height.clone(),
                    attached: true,
                },
            );
            MountedFrame {
                frame,
                content_window,
            }
        };
        trace!(frame = mounted.frame.0, src = %spec.src, "frame created");
        if self.auto_load {
            self.fire_load(mounted.frame);
        }
        Ok(mounted)
    }

    fn add_listener(&self, sender: mpsc::UnboundedSender<HostEvent>) -> ListenerId {
        let mut state = self.lock();
        let listener = ListenerId(state.next());
        state.listeners.insert(listener, sender);
        listener
    }

    fn remove_listener(&self, listener: ListenerId) {
        self.lock().listeners.remove(&listener);
    }

    fn post_message(
        &self,
        window: WindowId,
        message: &Value,
        target_origin: &str,
    ) -> Result<(), HostError> {
        let mut state = self.lock();
        let attached = state
            .frames
            .values()
            .any(|f| f.content_window == window && f.attached);
        if !attached {
            return Err(HostError::PostMessage {
                message: format!("window {} is not attached", window.0),
            });
        }
        state.posted.push(PostedMessage {
            window,
            target_origin: target_origin.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    fn set_frame_size(&self, frame: FrameId, size: &FrameSize) {
        let mut state = self.lock();
        if let Some(record) = state.frames.get_mut(&frame) {
            if let Some(width) = &size.width {
                record.width = width.clone();
            }
            if let Some(height) = &size.height {
                record.height = height.clone();
            }
        }
    }

    fn remove_frame(&self, frame: FrameId) {
        if let Some(record) = self.lock().frames.get_mut(&frame) {
            record.attached = false;
        }
    }
}
