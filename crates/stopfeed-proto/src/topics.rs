//! MQTT topic construction.
//!
//! A topic is the plain concatenation `{prefix}{mid}{stop_id}` — stable and
//! deterministic, so downstream consumers can subscribe per stop without a
//! discovery step. The mid segment separates prediction topics from event
//! topics.

use serde::{Deserialize, Serialize};

/// Topic naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Common prefix, e.g. `transit/`
    pub prefix: String,
    /// Mid segment for prediction topics, e.g. `predictions/`
    pub prediction_mid: String,
    /// Mid segment for event topics, e.g. `events/`
    pub event_mid: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: "transit/".to_string(),
            prediction_mid: "predictions/".to_string(),
            event_mid: "events/".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a scheme from its three segments.
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        prediction_mid: impl Into<String>,
        event_mid: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            prediction_mid: prediction_mid.into(),
            event_mid: event_mid.into(),
        }
    }

    /// Topic carrying prediction messages for a stop.
    #[must_use]
    pub fn prediction(&self, stop_id: &str) -> String {
        format!("{}{}{stop_id}", self.prefix, self.prediction_mid)
    }

    /// Topic carrying event messages for a stop.
    #[must_use]
    pub fn event(&self, stop_id: &str) -> String {
        format!("{}{}{stop_id}", self.prefix, self.event_mid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_plain_concatenation() {
        let scheme = TopicScheme::new("hsl/", "pred/", "ev/");

        assert_eq!(scheme.prediction("1020453"), "hsl/pred/1020453");
        assert_eq!(scheme.event("1020453"), "hsl/ev/1020453");
    }

    #[test]
    fn default_scheme() {
        let scheme = TopicScheme::default();

        assert_eq!(scheme.prediction("42"), "transit/predictions/42");
        assert_eq!(scheme.event("42"), "transit/events/42");
    }

    #[test]
    fn same_stop_same_topic() {
        let scheme = TopicScheme::default();

        assert_eq!(scheme.prediction("7"), scheme.prediction("7"));
    }
}
