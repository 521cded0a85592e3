//! Postgres-backed source client.

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use stopfeed_core::{EventRow, PredictionRow, SourceClient, SourceError};

/// Default prediction query.
///
/// Column contract: `stop_id` and `journey_id` (text), `stop_sequence`
/// (integer), `scheduled_time` and `predicted_time` (timestamptz).
pub const DEFAULT_PREDICTIONS_QUERY: &str = "\
    SELECT stop_id, journey_id, stop_sequence, scheduled_time, predicted_time \
    FROM departure_predictions \
    WHERE predicted_time IS NOT NULL";

/// Default event query.
///
/// Column contract: `stop_id`, `vehicle_id` and `event_type` (text),
/// `event_time` (timestamptz).
pub const DEFAULT_EVENTS_QUERY: &str = "\
    SELECT stop_id, vehicle_id, event_type, event_time \
    FROM vehicle_events";

/// Connection settings for the DOI/ROI databases.
#[derive(Debug, Clone)]
pub struct PgSourceConfig {
    /// DOI database URL; predictions are fetched here
    pub doi_url: String,
    /// ROI database URL; events are fetched here. Falls back to the DOI
    /// database when unset
    pub roi_url: Option<String>,
    /// Query returning the current prediction rows
    pub predictions_query: String,
    /// Query returning the current event rows
    pub events_query: String,
    /// Pool size per database
    pub max_connections: u32,
    /// How long a fetch may wait for a pooled connection
    pub acquire_timeout: Duration,
}

impl Default for PgSourceConfig {
    fn default() -> Self {
        Self {
            doi_url: "postgres://localhost/doi".to_string(),
            roi_url: None,
            predictions_query: DEFAULT_PREDICTIONS_QUERY.to_string(),
            events_query: DEFAULT_EVENTS_QUERY.to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// [`SourceClient`] backed by two Postgres pools.
#[derive(Debug)]
pub struct PgSourceClient {
    doi: PgPool,
    roi: PgPool,
    predictions_query: String,
    events_query: String,
}

impl PgSourceClient {
    /// Create the connection pools.
    ///
    /// Pools connect lazily, so this succeeds even while a database is down;
    /// the first fetch surfaces the connection error instead.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Connection`] if a database URL cannot be
    /// parsed.
    pub fn new(config: PgSourceConfig) -> Result<Self, SourceError> {
        let doi = pool(&config.doi_url, &config)?;
        let roi = match &config.roi_url {
            Some(url) if url != &config.doi_url => pool(url, &config)?,
            _ => doi.clone(),
        };
        Ok(Self {
            doi,
            roi,
            predictions_query: config.predictions_query,
            events_query: config.events_query,
        })
    }
}

fn pool(url: &str, config: &PgSourceConfig) -> Result<PgPool, SourceError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_lazy(url)
        .map_err(|e| SourceError::Connection(e.to_string()))
}

impl SourceClient for PgSourceClient {
    async fn fetch_predictions(&self) -> Result<Vec<PredictionRow>, SourceError> {
        let rows = sqlx::query(&self.predictions_query)
            .fetch_all(&self.doi)
            .await
            .map_err(|e| SourceError::Query(e.to_string()))?;
        Ok(decode_rows(&rows, decode_prediction))
    }

    async fn fetch_events(&self) -> Result<Vec<EventRow>, SourceError> {
        let rows = sqlx::query(&self.events_query)
            .fetch_all(&self.roi)
            .await
            .map_err(|e| SourceError::Query(e.to_string()))?;
        Ok(decode_rows(&rows, decode_event))
    }
}

/// Decode fetched rows, dropping the ones whose columns do not match the
/// contract. A misnamed column fails every row and shows up loudly in the
/// logs; a NULL decodes fine and is rejected by validation downstream.
fn decode_rows<T>(
    rows: &[PgRow],
    decode: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                tracing::warn!(%error, "Dropping undecodable row");
                None
            }
        })
        .collect()
}

fn decode_prediction(row: &PgRow) -> Result<PredictionRow, sqlx::Error> {
    Ok(PredictionRow {
        stop_id: row.try_get("stop_id")?,
        journey_id: row.try_get("journey_id")?,
        stop_sequence: row.try_get("stop_sequence")?,
        scheduled_time: row.try_get("scheduled_time")?,
        predicted_time: row.try_get("predicted_time")?,
    })
}

fn decode_event(row: &PgRow) -> Result<EventRow, sqlx::Error> {
    Ok(EventRow {
        stop_id: row.try_get("stop_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        event_type: row.try_get("event_type")?,
        event_time: row.try_get("event_time")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_reads_both_kinds() {
        let config = PgSourceConfig::default();

        assert!(config.predictions_query.contains("predicted_time"));
        assert!(config.events_query.contains("event_type"));
        assert!(config.roi_url.is_none());
    }

    #[tokio::test]
    async fn pools_are_created_lazily() {
        // No database is running here; construction must still succeed.
        let client = PgSourceClient::new(PgSourceConfig::default()).unwrap();

        assert_eq!(client.predictions_query, DEFAULT_PREDICTIONS_QUERY);
        assert_eq!(client.events_query, DEFAULT_EVENTS_QUERY);
    }

    #[test]
    fn invalid_url_is_a_connection_error() {
        let config = PgSourceConfig {
            doi_url: "not-a-database-url".to_string(),
            ..Default::default()
        };

        let err = PgSourceClient::new(config).unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)));
    }
}
