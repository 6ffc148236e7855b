//! # Message envelopes and validation
//!
//! Anything read from the cross-origin channel is untrusted. It goes through
//! [`validator::decode`] before any field is looked at; rejects are dropped by
//! the transport and never surface as errors.
//!
//! ```text
//! raw Value ──▶ validate (object + string `type`) ──▶ InboundMessage::from_envelope ──▶ InboundMessage
//!                    │                                         │
//!                    └────────────── Rejection ◀───────────────┘
//! ```

pub mod envelope;
pub mod validator;

pub use envelope::*;
pub use validator::{decode, is_valid_envelope, validate, Rejection};
