//! # Stopfeed Core
//!
//! Data model, bounded caches, and change detection for the Stopfeed bridge.
//!
//! This crate provides:
//! - Prediction and event records, with validation of the raw rows the
//!   source hands back
//! - Fixed-capacity LRU caches holding the publish baselines
//! - Two-threshold change detection for predictions and state-transition
//!   detection for events
//! - The `SourceClient` contract the poll scheduler drives

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod detect;
pub mod model;
pub mod source;

pub use cache::{BoundedCache, CacheEntry};
pub use detect::{BaselinePolicy, Classification, EventDetector, PredictionDetector};
pub use model::{
    EventKey, EventRecord, EventRow, EventType, MalformedRecord, PredictionKey, PredictionRecord,
    PredictionRow,
};
pub use source::{SourceClient, SourceError};
