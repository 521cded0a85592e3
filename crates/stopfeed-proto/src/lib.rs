//! # Stopfeed Protocol
//!
//! MQTT topic scheme and JSON wire payloads for the Stopfeed bridge.
//!
//! ## Topics
//!
//! `{prefix}{mid}{stop_id}` — one topic per stop per record kind, e.g.
//! `transit/predictions/1020453` and `transit/events/1020453`.
//!
//! ## Messages
//!
//! Each poll cycle publishes at most one message per stop per record kind:
//! the cycle's qualifying records grouped by stop, stamped with a message
//! timestamp.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod topics;

pub use messages::{
    arrange_events, arrange_predictions, EventItem, EventMessage, MessageError, OutboundMessage,
    PredictionItem, PredictionMessage,
};
pub use topics::TopicScheme;
