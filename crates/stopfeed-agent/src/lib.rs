//! # Stopfeed Agent
//!
//! Bridge runtime from the DOI/ROI prediction databases to per-stop MQTT
//! topics.
//!
//! ## Pipeline
//!
//! Each poll cycle runs fetch → detect → publish → update:
//! 1. **Fetch**: read the current prediction and event rows from the source
//! 2. **Detect**: diff every record against the cached baseline, applying
//!    the pre-journey and change thresholds
//! 3. **Publish**: one JSON message per stop per record kind, at the
//!    configured QoS
//! 4. **Update**: commit new baselines and sweep entries the source stopped
//!    reporting
//!
//! Cycles run inline on the scheduler task at a fixed interval; ticks due
//! while a cycle is still running are coalesced, never run concurrently.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod publisher;
pub mod runtime;
pub mod scheduler;

pub use config::BridgeConfig;
pub use runtime::Bridge;
