//! The pipeline's view of the prediction databases.

use crate::model::{EventRow, PredictionRow};

/// Errors from the data source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Could not reach or authenticate against the source
    #[error("source connection error: {0}")]
    Connection(String),
    /// A fetch query failed or timed out
    #[error("source query error: {0}")]
    Query(String),
}

/// A client returning the current prediction and event rows once per poll
/// cycle.
///
/// Implementations own their connection handling and query timeouts; a
/// returned error abandons the domain's sub-cycle and the next tick retries
/// naturally.
#[allow(async_fn_in_trait)]
pub trait SourceClient {
    /// Fetch the current prediction rows.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the query or the connection fails.
    async fn fetch_predictions(&self) -> Result<Vec<PredictionRow>, SourceError>;

    /// Fetch the current event rows.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the query or the connection fails.
    async fn fetch_events(&self) -> Result<Vec<EventRow>, SourceError>;
}
