//! # Stopfeed Postgres Adapter
//!
//! [`SourceClient`](stopfeed_core::SourceClient) implementation backed by
//! the DOI/ROI prediction databases.
//!
//! The bridge does not own the SQL schema: the two fetch queries are
//! configuration, and any query yielding the documented column sets works.
//! Rows come back with nullable columns; validation happens downstream in
//! the pipeline so one bad row never aborts a cycle.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;

pub use client::{PgSourceClient, PgSourceConfig, DEFAULT_EVENTS_QUERY, DEFAULT_PREDICTIONS_QUERY};
