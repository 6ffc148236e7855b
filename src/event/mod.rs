//! # Event-Driven Architecture
//!
//! Every validated notification from the frame ends up on the widget's
//! [`EventBus`], after the session cache has been reconciled.
//!
//! ## Architecture Overview
//!
//! - **EventBus**: synchronous, failure-isolating dispatch plus `wait_for`
//! - **HandlerRegistry**: event kind → ordered, duplicate-free handler list
//! - **EventKind**: closed set of notification kinds plus `Custom`
//!
//! ## Event Flow
//!
//! ```text
//! ┌───────┐    ┌───────────┐    ┌────────────┐    ┌──────────┐    ┌─────────┐
//! │ Frame │───▶│ Transport │───▶│ Reconciler │───▶│ EventBus │───▶│ Handler │
//! └───────┘    └───────────┘    └────────────┘    └──────────┘    └─────────┘
//! ```
//!
//! ## Usage Examples
//!
//! ### Subscribing to Events
//!
//! ```rust,no_run
//! # use widget_bridge::event::{handler, EventBus, EventKind};
//! # use widget_bridge::message::InboundMessage;
//! let bus = EventBus::default();
//! let on_allocations = handler(|message| {
//!     if let InboundMessage::AllocationsUpdated(update) = message {
//!         println!("total is now {}", update.total_amount);
//!     }
//!     Ok(())
//! });
//! bus.on(EventKind::AllocationsUpdated, &on_allocations);
//! // later
//! bus.off(EventKind::AllocationsUpdated, Some(&on_allocations));
//! ```
//!
//! ### Waiting for the Next Occurrence
//!
//! ```rust,no_run
//! # use widget_bridge::event::{EventBus, EventKind};
//! # use std::time::Duration;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::default();
//! let resized = bus.wait_for(EventKind::Resize, Some(Duration::from_secs(2))).await?;
//! println!("{:?}", resized);
//! # Ok(())
//! # }
//! ```

pub mod event_bus;
pub mod event_registry;

pub use event_bus::EventBus;
pub use event_registry::{handler, EventKind, Handler, HandlerError, HandlerRegistry, HandlerResult};
