//! Records polled from the prediction databases.
//!
//! The source hands back raw rows with nullable columns; `validate` turns a
//! row into a record or rejects it, so a single bad row never aborts a poll
//! cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a prediction: one live prediction per stop visit of a journey.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredictionKey {
    /// Stop identifier
    pub stop_id: String,
    /// Dated journey identifier
    pub journey_id: String,
    /// Stop order within the journey pattern
    pub stop_sequence: u32,
}

/// A departure prediction for one stop visit.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    /// Stop identifier
    pub stop_id: String,
    /// Dated journey identifier
    pub journey_id: String,
    /// Stop order within the journey pattern
    pub stop_sequence: u32,
    /// Timetabled departure time, if the source reports one
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Predicted departure time; upstream replaces it with the observed time
    /// once the vehicle has called at the stop
    pub predicted_time: DateTime<Utc>,
}

impl PredictionRecord {
    /// Cache key of this record.
    #[must_use]
    pub fn key(&self) -> PredictionKey {
        PredictionKey {
            stop_id: self.stop_id.clone(),
            journey_id: self.journey_id.clone(),
            stop_sequence: self.stop_sequence,
        }
    }
}

/// Identity of an event: one live event per vehicle per stop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Stop identifier
    pub stop_id: String,
    /// Vehicle identifier
    pub vehicle_id: String,
}

/// State of a vehicle relative to a stop, as observed by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// The vehicle is expected to call at the stop
    Expected,
    /// The vehicle is at the stop
    AtStop,
    /// Boarding is in progress
    Boarding,
    /// The vehicle has departed
    Departed,
    /// The vehicle passed without stopping
    Passed,
    /// The call was cancelled
    Cancelled,
}

impl EventType {
    /// Parse the source's textual state column.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "EXPECTED" => Some(Self::Expected),
            "AT_STOP" => Some(Self::AtStop),
            "BOARDING" => Some(Self::Boarding),
            "DEPARTED" => Some(Self::Departed),
            "PASSED" => Some(Self::Passed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// An observed vehicle event at a stop.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Stop identifier
    pub stop_id: String,
    /// Vehicle identifier
    pub vehicle_id: String,
    /// Observed state
    pub event_type: EventType,
    /// When the state was observed
    pub event_time: DateTime<Utc>,
}

impl EventRecord {
    /// Cache key of this record.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            stop_id: self.stop_id.clone(),
            vehicle_id: self.vehicle_id.clone(),
        }
    }
}

/// A prediction row as returned by the source, before validation.
#[derive(Debug, Clone, Default)]
pub struct PredictionRow {
    /// Stop identifier column
    pub stop_id: Option<String>,
    /// Journey identifier column
    pub journey_id: Option<String>,
    /// Stop order column
    pub stop_sequence: Option<i32>,
    /// Timetabled departure time column
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Predicted departure time column
    pub predicted_time: Option<DateTime<Utc>>,
}

impl PredictionRow {
    /// Turn the row into a record, rejecting incomplete data.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRecord`] if an identifier or the predicted time is
    /// missing, or if the stop sequence is negative.
    pub fn validate(self) -> Result<PredictionRecord, MalformedRecord> {
        let stop_id = require_id(self.stop_id, "stop_id")?;
        let journey_id = require_id(self.journey_id, "journey_id")?;
        let stop_sequence = match self.stop_sequence {
            Some(value) => u32::try_from(value)
                .map_err(|_| MalformedRecord::InvalidSequence { value })?,
            None => return Err(MalformedRecord::MissingField { field: "stop_sequence" }),
        };
        let predicted_time = self
            .predicted_time
            .ok_or(MalformedRecord::MissingField { field: "predicted_time" })?;
        Ok(PredictionRecord {
            stop_id,
            journey_id,
            stop_sequence,
            scheduled_time: self.scheduled_time,
            predicted_time,
        })
    }
}

/// An event row as returned by the source, before validation.
#[derive(Debug, Clone, Default)]
pub struct EventRow {
    /// Stop identifier column
    pub stop_id: Option<String>,
    /// Vehicle identifier column
    pub vehicle_id: Option<String>,
    /// Textual state column
    pub event_type: Option<String>,
    /// Observation time column
    pub event_time: Option<DateTime<Utc>>,
}

impl EventRow {
    /// Turn the row into a record, rejecting incomplete data.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRecord`] if an identifier or the event time is
    /// missing, or if the state column does not name a known event type.
    pub fn validate(self) -> Result<EventRecord, MalformedRecord> {
        let stop_id = require_id(self.stop_id, "stop_id")?;
        let vehicle_id = require_id(self.vehicle_id, "vehicle_id")?;
        let raw_type = require_id(self.event_type, "event_type")?;
        let event_type = EventType::parse(&raw_type)
            .ok_or(MalformedRecord::UnknownEventType { value: raw_type })?;
        let event_time = self
            .event_time
            .ok_or(MalformedRecord::MissingField { field: "event_time" })?;
        Ok(EventRecord {
            stop_id,
            vehicle_id,
            event_type,
            event_time,
        })
    }
}

fn require_id(value: Option<String>, field: &'static str) -> Result<String, MalformedRecord> {
    match value {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(MalformedRecord::MissingField { field }),
    }
}

/// A row the pipeline cannot use.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MalformedRecord {
    /// A required column is NULL or empty
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the missing column
        field: &'static str,
    },
    /// The stop sequence is out of range
    #[error("invalid stop sequence: {value}")]
    InvalidSequence {
        /// The rejected value
        value: i32,
    },
    /// The state column does not name a known event type
    #[error("unknown event type: {value}")]
    UnknownEventType {
        /// The rejected value
        value: String,
    },
}
