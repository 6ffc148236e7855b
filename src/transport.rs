//! # Transport
//!
//! Owns one frame per mount and the single inbound listener tied to it.
//!
//! ## Responsibilities
//!
//! - **Frame lifecycle**: resolve the container, create the frame, remove it on `destroy`
//! - **Origin pinning**: the target origin is computed once from the base
//!   address and used for every outbound post; inbound messages must come
//!   from the owned frame's window and report that same origin
//! - **Init handshake**: after the frame loads, post the init envelope after
//!   `init_delay`, then again every `init_retry_interval` until `ready`
//!   arrives or `init_max_attempts` is reached
//! - **Pending queue**: every other command is queued until `ready`, then
//!   flushed in FIFO order
//!
//! ## Generations
//!
//! Each mount bumps a generation counter and `destroy` bumps it again. The
//! pump and init tasks carry the generation they were started for and stop
//! as soon as it is stale, so nothing from a previous mount leaks into the
//! next one.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::{
    config::WidgetConfig,
    host::{
        FrameHost, FrameId, FrameSpec, HostEvent, MountTarget, MountedFrame, Subscription,
        WindowId,
    },
    message::{validator, InboundMessage, OutboundMessage, Rejection, ResizePayload},
    WidgetError, WidgetResult,
};

/// Receives validated inbound messages, in delivery order, one at a time.
pub trait InboundSink: Send + Sync {
    fn deliver(&self, message: InboundMessage);
}

/// What [`Transport::send`] did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
    /// An init command with no frame to receive it.
    Dropped,
}

struct ActiveMount {
    frame: FrameId,
    window: WindowId,
    address: Url,
    init: OutboundMessage,
    subscription: Subscription,
    pump: JoinHandle<()>,
    init_task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TransportState {
    generation: u64,
    mount: Option<ActiveMount>,
    ready: bool,
    pending: VecDeque<OutboundMessage>,
}

struct TransportInner {
    host: Arc<dyn FrameHost>,
    target_origin: String,
    config: WidgetConfig,
    state: Mutex<TransportState>,
}

pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    /// Derives the target origin from `base`. Opaque origins are rejected.
    pub fn new(host: Arc<dyn FrameHost>, base: &Url, config: WidgetConfig) -> WidgetResult<Self> {
        let origin = base.origin();
        if !origin.is_tuple() {
            return Err(WidgetError::invalid_config(format!(
                "widget address {} has no usable origin",
                base
            )));
        }
        Ok(Self {
            inner: Arc::new(TransportInner {
                host,
                target_origin: origin.ascii_serialization(),
                config,
                state: Mutex::new(TransportState::default()),
            }),
        })
    }

    /// Creates the frame at `address` inside `target` and starts listening.
    ///
    /// An existing mount is destroyed first. `init` is posted once the frame
    /// has loaded; everything sent through [`Transport::send`] waits for `ready`.
    #[instrument(skip(self, address, init, sink), fields(init = init.message_type()))]
    pub fn mount(
        &self,
        target: &MountTarget,
        address: Url,
        init: OutboundMessage,
        sink: Weak<dyn InboundSink>,
    ) -> WidgetResult<MountedFrame> {
        if self.is_mounted() {
            debug!("frame already mounted, remounting");
            self.destroy();
        }

        let host = &self.inner.host;
        let container =
            host.resolve_container(target)
                .ok_or_else(|| WidgetError::ContainerNotFound {
                    target: target.to_string(),
                })?;

        // Listen before the frame exists so its load event cannot be missed.
        let (subscription, rx) = Subscription::listen(host.clone());
        let mounted = host
            .create_frame(container, &FrameSpec::new(address.clone()))
            .map_err(|e| WidgetError::mount_failed("could not create widget frame", e))?;

        let mut state = self.inner.lock();
        state.generation += 1;
        state.ready = false;
        let generation = state.generation;
        let pump_task = tokio::spawn(pump(self.inner.clone(), generation, mounted, rx, sink));
        state.mount = Some(ActiveMount {
            frame: mounted.frame,
            window: mounted.content_window,
            address,
            init,
            subscription,
            pump: pump_task,
            init_task: None,
        });
        debug!(frame = mounted.frame.0, generation, "frame mounted");
        Ok(mounted)
    }

    /// Posts `message` now if the remote is ready, otherwise queues it.
    ///
    /// Init commands never wait for `ready`: they go straight to the mounted
    /// frame, or are dropped when there is none.
    pub fn send(&self, message: OutboundMessage) -> Delivery {
        let mut state = self.inner.lock();
        if message.is_init() {
            return match &state.mount {
                Some(mount) => {
                    self.inner.post(mount.window, &message);
                    Delivery::Sent
                }
                None => {
                    debug!(kind = message.message_type(), "no frame for init, dropping");
                    Delivery::Dropped
                }
            };
        }
        if state.ready {
            if let Some(mount) = &state.mount {
                self.inner.post(mount.window, &message);
                return Delivery::Sent;
            }
        }
        trace!(kind = message.message_type(), "queueing until ready");
        state.pending.push_back(message);
        Delivery::Queued
    }

    /// Applies a `resize` notification to the frame's style.
    pub fn resize(&self, resize: &ResizePayload) {
        let size = resize.frame_size();
        if size.width.is_none() && size.height.is_none() {
            return;
        }
        let frame = self.inner.lock().mount.as_ref().map(|m| m.frame);
        if let Some(frame) = frame {
            self.inner.host.set_frame_size(frame, &size);
        }
    }

    /// Tears the mount down. Safe to call at any time, any number of times.
    ///
    /// Posts a best-effort `destroy` when the remote was ready, stops the
    /// listener and init tasks, removes the frame and clears the queue.
    pub fn destroy(&self) {
        let (mount, was_ready) = {
            let mut state = self.inner.lock();
            state.generation += 1;
            let was_ready = state.ready;
            state.ready = false;
            state.pending.clear();
            (state.mount.take(), was_ready)
        };

        let Some(mut mount) = mount else {
            return;
        };
        if was_ready {
            self.inner.post(mount.window, &OutboundMessage::Destroy);
        }
        if let Some(init_task) = mount.init_task.take() {
            init_task.abort();
        }
        mount.pump.abort();
        mount.subscription.dispose();
        self.inner.host.remove_frame(mount.frame);
        debug!(frame = mount.frame.0, "frame destroyed");
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.lock().mount.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn target_origin(&self) -> &str {
        &self.inner.target_origin
    }

    pub fn frame(&self) -> Option<FrameId> {
        self.inner.lock().mount.as_ref().map(|m| m.frame)
    }

    pub fn address(&self) -> Option<Url> {
        self.inner.lock().mount.as_ref().map(|m| m.address.clone())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl TransportInner {
    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, window: WindowId, message: &OutboundMessage) {
        match self
            .host
            .post_message(window, &message.to_envelope(), &self.target_origin)
        {
            Ok(()) => trace!(kind = message.message_type(), "posted"),
            Err(e) => warn!(kind = message.message_type(), error = %e, "post failed"),
        }
    }

    fn on_frame_loaded(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        let task = tokio::spawn(run_init(self.clone(), generation));
        if let Some(mount) = state.mount.as_mut() {
            if let Some(previous) = mount.init_task.replace(task) {
                previous.abort();
            }
        }
    }

    /// Posts the init envelope unless the mount is stale or already ready.
    fn post_init(&self, generation: u64) -> bool {
        let state = self.lock();
        if state.generation != generation || state.ready {
            return false;
        }
        match &state.mount {
            Some(mount) => {
                self.post(mount.window, &mount.init);
                true
            }
            None => false,
        }
    }

    fn is_ready_for(&self, generation: u64) -> bool {
        let state = self.lock();
        state.generation == generation && state.ready
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Sets readiness and flushes the queue in FIFO order, under one lock so
    /// no concurrent `send` can overtake a queued command.
    ///
    /// Returns `false` when `generation` is stale.
    fn mark_ready(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        if state.ready {
            return true;
        }
        let Some(window) = state.mount.as_ref().map(|m| m.window) else {
            return false;
        };
        state.ready = true;
        let pending: Vec<_> = state.pending.drain(..).collect();
        debug!(flushed = pending.len(), "remote ready");
        for message in &pending {
            self.post(window, message);
        }
        true
    }

    fn reject(&self, rejection: &Rejection) {
        if self.config.debug {
            warn!(%rejection, "dropping inbound message");
        } else {
            trace!(%rejection, "dropping inbound message");
        }
    }
}

async fn pump(
    inner: Arc<TransportInner>,
    generation: u64,
    mounted: MountedFrame,
    mut rx: mpsc::UnboundedReceiver<HostEvent>,
    sink: Weak<dyn InboundSink>,
) {
    while let Some(event) = rx.recv().await {
        if !inner.is_current(generation) {
            break;
        }
        match event {
            HostEvent::FrameLoaded { frame } if frame == mounted.frame => {
                inner.on_frame_loaded(generation);
            }
            HostEvent::FrameLoaded { .. } => {}
            HostEvent::Message {
                source,
                origin,
                data,
            } => {
                if source != Some(mounted.content_window) {
                    trace!(?source, "ignoring message from another window");
                    continue;
                }
                if origin != inner.target_origin {
                    trace!(%origin, "ignoring message from unexpected origin");
                    continue;
                }
                let message = match validator::decode(&data) {
                    Ok(message) => message,
                    Err(rejection) => {
                        inner.reject(&rejection);
                        continue;
                    }
                };
                // A remount may have happened since the loop check.
                let current = match message {
                    InboundMessage::Ready(_) => inner.mark_ready(generation),
                    _ => inner.is_current(generation),
                };
                if !current {
                    break;
                }
                let Some(sink) = sink.upgrade() else {
                    break;
                };
                sink.deliver(message);
            }
        }
    }
    trace!(generation, "inbound pump stopped");
}

async fn run_init(inner: Arc<TransportInner>, generation: u64) {
    let attempts = inner.config.init_max_attempts.max(1);
    tokio::time::sleep(inner.config.init_delay).await;
    for attempt in 1..=attempts {
        if !inner.post_init(generation) {
            return;
        }
        debug!(attempt, attempts, "init envelope posted");
        tokio::time::sleep(inner.config.init_retry_interval).await;
    }
    if inner.is_current(generation) && !inner.is_ready_for(generation) {
        warn!(attempts, "remote widget did not acknowledge init");
    }
}
