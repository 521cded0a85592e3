//! JSON wire payloads.
//!
//! Qualifying records are grouped by stop before publishing: one message per
//! stop per record kind per cycle, stamped with the cycle's wall-clock
//! timestamp so consumers can reason about staleness. Field names are
//! camelCase on the wire; timestamps are RFC 3339.

use crate::topics::TopicScheme;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stopfeed_core::{EventRecord, EventType, PredictionRecord};

/// One prediction as serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionItem {
    /// Stop identifier (also the topic's trailing segment)
    pub stop_id: String,
    /// Dated journey identifier
    pub journey_id: String,
    /// Stop order within the journey pattern
    pub stop_sequence: u32,
    /// Timetabled departure time, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Predicted departure time
    pub predicted_time: DateTime<Utc>,
}

impl From<&PredictionRecord> for PredictionItem {
    fn from(record: &PredictionRecord) -> Self {
        Self {
            stop_id: record.stop_id.clone(),
            journey_id: record.journey_id.clone(),
            stop_sequence: record.stop_sequence,
            scheduled_time: record.scheduled_time,
            predicted_time: record.predicted_time,
        }
    }
}

/// Per-stop prediction message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionMessage {
    /// When this cycle's message was assembled
    pub message_timestamp: DateTime<Utc>,
    /// The stop's qualifying predictions, in detection order
    pub predictions: Vec<PredictionItem>,
}

impl PredictionMessage {
    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }
}

/// One event as serialized onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    /// Stop identifier (also the topic's trailing segment)
    pub stop_id: String,
    /// Vehicle identifier
    pub vehicle_id: String,
    /// Observed state
    pub event: EventType,
    /// When the state was observed
    pub event_time: DateTime<Utc>,
}

impl From<&EventRecord> for EventItem {
    fn from(record: &EventRecord) -> Self {
        Self {
            stop_id: record.stop_id.clone(),
            vehicle_id: record.vehicle_id.clone(),
            event: record.event_type,
            event_time: record.event_time,
        }
    }
}

/// Per-stop event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    /// When this cycle's message was assembled
    pub message_timestamp: DateTime<Utc>,
    /// The stop's qualifying events, in detection order
    pub events: Vec<EventItem>,
}

impl EventMessage {
    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }
}

/// A per-stop message with its resolved topic, ready for publishing.
#[derive(Debug, Clone)]
pub struct OutboundMessage<M> {
    /// Stop the message belongs to
    pub stop_id: String,
    /// Fully resolved topic
    pub topic: String,
    /// The payload
    pub message: M,
}

/// Group qualifying predictions into one message per stop.
///
/// Stop order follows first appearance in the input, so the publish order is
/// deterministic for a given detection order.
#[must_use]
pub fn arrange_predictions(
    records: &[&PredictionRecord],
    scheme: &TopicScheme,
    message_timestamp: DateTime<Utc>,
) -> Vec<OutboundMessage<PredictionMessage>> {
    let (order, mut by_stop) = group_by_stop(records.iter().map(|r| (&r.stop_id, *r)));
    order
        .into_iter()
        .map(|stop_id| {
            let predictions = by_stop
                .remove(&stop_id)
                .unwrap_or_default()
                .iter()
                .map(|record| PredictionItem::from(*record))
                .collect();
            OutboundMessage {
                topic: scheme.prediction(&stop_id),
                message: PredictionMessage {
                    message_timestamp,
                    predictions,
                },
                stop_id,
            }
        })
        .collect()
}

/// Group qualifying events into one message per stop.
#[must_use]
pub fn arrange_events(
    records: &[&EventRecord],
    scheme: &TopicScheme,
    message_timestamp: DateTime<Utc>,
) -> Vec<OutboundMessage<EventMessage>> {
    let (order, mut by_stop) = group_by_stop(records.iter().map(|r| (&r.stop_id, *r)));
    order
        .into_iter()
        .map(|stop_id| {
            let events = by_stop
                .remove(&stop_id)
                .unwrap_or_default()
                .iter()
                .map(|record| EventItem::from(*record))
                .collect();
            OutboundMessage {
                topic: scheme.event(&stop_id),
                message: EventMessage {
                    message_timestamp,
                    events,
                },
                stop_id,
            }
        })
        .collect()
}

fn group_by_stop<'a, R: 'a>(
    records: impl Iterator<Item = (&'a String, &'a R)>,
) -> (Vec<String>, HashMap<String, Vec<&'a R>>) {
    let mut order = Vec::new();
    let mut by_stop: HashMap<String, Vec<&R>> = HashMap::new();
    for (stop_id, record) in records {
        if !by_stop.contains_key(stop_id) {
            order.push(stop_id.clone());
        }
        by_stop.entry(stop_id.clone()).or_default().push(record);
    }
    (order, by_stop)
}

/// Errors for payload serialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    fn prediction(stop_id: &str, journey_id: &str) -> PredictionRecord {
        PredictionRecord {
            stop_id: stop_id.to_string(),
            journey_id: journey_id.to_string(),
            stop_sequence: 1,
            scheduled_time: None,
            predicted_time: noon(),
        }
    }

    #[test]
    fn predictions_group_by_stop_in_first_seen_order() {
        let a1 = prediction("A", "j1");
        let b1 = prediction("B", "j2");
        let a2 = prediction("A", "j3");
        let records = vec![&a1, &b1, &a2];

        let messages = arrange_predictions(&records, &TopicScheme::default(), noon());

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].stop_id, "A");
        assert_eq!(messages[0].topic, "transit/predictions/A");
        assert_eq!(messages[0].message.predictions.len(), 2);
        assert_eq!(messages[1].stop_id, "B");
        assert_eq!(messages[1].message.predictions.len(), 1);
    }

    #[test]
    fn empty_input_yields_no_messages() {
        let messages = arrange_predictions(&[], &TopicScheme::default(), noon());
        assert!(messages.is_empty());
    }

    #[test]
    fn prediction_json_uses_camel_case() {
        let record = prediction("A", "j1");
        let message = PredictionMessage {
            message_timestamp: noon(),
            predictions: vec![PredictionItem::from(&record)],
        };

        let value: serde_json::Value =
            serde_json::from_slice(&message.to_json().unwrap()).unwrap();

        assert!(value.get("messageTimestamp").is_some());
        let item = &value["predictions"][0];
        assert_eq!(item["stopId"], "A");
        assert_eq!(item["journeyId"], "j1");
        assert!(item.get("predictedTime").is_some());
        // No scheduled time was known, so the field is omitted entirely.
        assert!(item.get("scheduledTime").is_none());
    }

    #[test]
    fn event_state_serializes_screaming_snake() {
        let record = EventRecord {
            stop_id: "A".to_string(),
            vehicle_id: "V-1".to_string(),
            event_type: EventType::AtStop,
            event_time: noon(),
        };
        let message = EventMessage {
            message_timestamp: noon(),
            events: vec![EventItem::from(&record)],
        };

        let value: serde_json::Value =
            serde_json::from_slice(&message.to_json().unwrap()).unwrap();

        assert_eq!(value["events"][0]["event"], "AT_STOP");
        assert_eq!(value["events"][0]["vehicleId"], "V-1");
    }

    #[test]
    fn message_json_roundtrip() {
        let record = prediction("A", "j1");
        let message = PredictionMessage {
            message_timestamp: noon(),
            predictions: vec![PredictionItem::from(&record)],
        };

        let decoded: PredictionMessage =
            serde_json::from_slice(&message.to_json().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
}
