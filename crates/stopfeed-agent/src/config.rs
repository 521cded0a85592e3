//! Bridge configuration.
//!
//! Loaded once at startup from `STOPFEED_*` environment variables; the
//! process must be restarted to pick up changes.

use anyhow::{anyhow, bail, Context, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use stopfeed_core::BaselinePolicy;
use stopfeed_proto::TopicScheme;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Poll pipeline tuning
    pub pipeline: PipelineConfig,
    /// MQTT connection and topic naming
    pub mqtt: MqttConfig,
    /// Prediction database connection
    pub source: SourceConfig,
}

/// Poll pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Time between poll cycles
    pub poll_interval: Duration,
    /// Predictions further ahead than this many seconds are not published
    pub pre_journey_threshold_s: u32,
    /// Minimum prediction delta, in seconds, that counts as a real change
    pub change_threshold_s: u32,
    /// Prediction cache capacity
    pub prediction_cache_size: NonZeroUsize,
    /// Event cache capacity
    pub event_cache_size: NonZeroUsize,
    /// Entries unseen for more than this many cycles are dropped
    pub stale_after_cycles: u64,
    /// Stored-time policy for unchanged predictions
    pub baseline_policy: BaselinePolicy,
}

/// MQTT connection and topic naming.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker URL, e.g. `tcp://localhost:1883`
    pub broker: String,
    /// Delivery guarantee: 0 at-most-once, 1 at-least-once, 2 exactly-once
    pub qos: u8,
    /// Common topic prefix
    pub topic_prefix: String,
    /// Mid segment for prediction topics
    pub prediction_mid: String,
    /// Mid segment for event topics
    pub event_mid: String,
    /// CA bundle path; TLS is enabled iff this is set
    pub ca_path: Option<PathBuf>,
    /// Username; used iff the password is also set
    pub username: Option<String>,
    /// Password; used iff the username is also set
    pub password: Option<String>,
    /// Client identifier; generated randomly when unset
    pub client_id: Option<String>,
    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl MqttConfig {
    /// The topic scheme this configuration describes.
    #[must_use]
    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme::new(
            self.topic_prefix.clone(),
            self.prediction_mid.clone(),
            self.event_mid.clone(),
        )
    }
}

/// Prediction database connection.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// DOI database URL (predictions)
    pub doi_url: String,
    /// ROI database URL (events); falls back to the DOI URL
    pub roi_url: Option<String>,
    /// Override for the prediction query
    pub predictions_query: Option<String>,
    /// Override for the event query
    pub events_query: Option<String>,
    /// Pool size per database
    pub max_connections: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                poll_interval: Duration::from_secs(10),
                pre_journey_threshold_s: 600,
                change_threshold_s: 10,
                prediction_cache_size: NonZeroUsize::new(20_000).expect("nonzero"),
                event_cache_size: NonZeroUsize::new(5_000).expect("nonzero"),
                stale_after_cycles: 30,
                baseline_policy: BaselinePolicy::Hold,
            },
            mqtt: MqttConfig {
                broker: "tcp://localhost:1883".to_string(),
                qos: 1,
                topic_prefix: "transit/".to_string(),
                prediction_mid: "predictions/".to_string(),
                event_mid: "events/".to_string(),
                ca_path: None,
                username: None,
                password: None,
                client_id: None,
                keep_alive: Duration::from_secs(30),
            },
            source: SourceConfig {
                doi_url: "postgres://localhost/doi".to_string(),
                roi_url: None,
                predictions_query: None,
                events_query: None,
                max_connections: 4,
            },
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `STOPFEED_POLL_INTERVAL`: ISO-8601 duration, e.g. `PT10S`
    /// - `STOPFEED_PRE_JOURNEY_THRESHOLD_S`: publish-eligibility lead time
    /// - `STOPFEED_CHANGE_THRESHOLD_S`: minimum delta counting as a change
    /// - `STOPFEED_PREDICTION_CACHE_SIZE` / `STOPFEED_EVENT_CACHE_SIZE`
    /// - `STOPFEED_STALE_AFTER_CYCLES`: staleness sweep age
    /// - `STOPFEED_BASELINE_POLICY`: `hold` or `refresh`
    /// - `STOPFEED_MQTT_BROKER`, `STOPFEED_MQTT_QOS`,
    ///   `STOPFEED_MQTT_CA_PATH`, `STOPFEED_MQTT_USERNAME`,
    ///   `STOPFEED_MQTT_PASSWORD`, `STOPFEED_MQTT_CLIENT_ID`
    /// - `STOPFEED_TOPIC_PREFIX`, `STOPFEED_PREDICTION_MID`,
    ///   `STOPFEED_EVENT_MID`
    /// - `STOPFEED_DOI_URL`, `STOPFEED_ROI_URL`,
    ///   `STOPFEED_PREDICTIONS_QUERY`, `STOPFEED_EVENTS_QUERY`
    ///
    /// # Errors
    ///
    /// Returns error if a set variable does not parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("STOPFEED_POLL_INTERVAL") {
            config.pipeline.poll_interval = parse_iso8601_duration(&interval)
                .context("Invalid STOPFEED_POLL_INTERVAL")?;
        }

        if let Ok(threshold) = std::env::var("STOPFEED_PRE_JOURNEY_THRESHOLD_S") {
            config.pipeline.pre_journey_threshold_s =
                threshold.parse().context("Invalid STOPFEED_PRE_JOURNEY_THRESHOLD_S")?;
        }

        if let Ok(threshold) = std::env::var("STOPFEED_CHANGE_THRESHOLD_S") {
            config.pipeline.change_threshold_s =
                threshold.parse().context("Invalid STOPFEED_CHANGE_THRESHOLD_S")?;
        }

        if let Ok(size) = std::env::var("STOPFEED_PREDICTION_CACHE_SIZE") {
            config.pipeline.prediction_cache_size =
                parse_cache_size(&size).context("Invalid STOPFEED_PREDICTION_CACHE_SIZE")?;
        }

        if let Ok(size) = std::env::var("STOPFEED_EVENT_CACHE_SIZE") {
            config.pipeline.event_cache_size =
                parse_cache_size(&size).context("Invalid STOPFEED_EVENT_CACHE_SIZE")?;
        }

        if let Ok(age) = std::env::var("STOPFEED_STALE_AFTER_CYCLES") {
            config.pipeline.stale_after_cycles =
                age.parse().context("Invalid STOPFEED_STALE_AFTER_CYCLES")?;
        }

        if let Ok(policy) = std::env::var("STOPFEED_BASELINE_POLICY") {
            config.pipeline.baseline_policy =
                parse_baseline_policy(&policy).context("Invalid STOPFEED_BASELINE_POLICY")?;
        }

        if let Ok(broker) = std::env::var("STOPFEED_MQTT_BROKER") {
            config.mqtt.broker = broker;
        }

        if let Ok(qos) = std::env::var("STOPFEED_MQTT_QOS") {
            config.mqtt.qos = parse_qos(&qos).context("Invalid STOPFEED_MQTT_QOS")?;
        }

        if let Ok(path) = std::env::var("STOPFEED_MQTT_CA_PATH") {
            config.mqtt.ca_path = Some(PathBuf::from(path));
        }

        if let Ok(username) = std::env::var("STOPFEED_MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }

        if let Ok(password) = std::env::var("STOPFEED_MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }

        if let Ok(client_id) = std::env::var("STOPFEED_MQTT_CLIENT_ID") {
            config.mqtt.client_id = Some(client_id);
        }

        if let Ok(prefix) = std::env::var("STOPFEED_TOPIC_PREFIX") {
            config.mqtt.topic_prefix = prefix;
        }

        if let Ok(mid) = std::env::var("STOPFEED_PREDICTION_MID") {
            config.mqtt.prediction_mid = mid;
        }

        if let Ok(mid) = std::env::var("STOPFEED_EVENT_MID") {
            config.mqtt.event_mid = mid;
        }

        if let Ok(url) = std::env::var("STOPFEED_DOI_URL") {
            config.source.doi_url = url;
        }

        if let Ok(url) = std::env::var("STOPFEED_ROI_URL") {
            config.source.roi_url = Some(url);
        }

        if let Ok(query) = std::env::var("STOPFEED_PREDICTIONS_QUERY") {
            config.source.predictions_query = Some(query);
        }

        if let Ok(query) = std::env::var("STOPFEED_EVENTS_QUERY") {
            config.source.events_query = Some(query);
        }

        Ok(config)
    }
}

/// Parse an ISO-8601 duration of the `PnDTnHnMnS` form.
///
/// Calendar designators (years, months, weeks) are rejected: a poll interval
/// must be an exact length of time. Fractional values are accepted in any
/// position, with `,` or `.` as the separator.
///
/// # Errors
///
/// Returns error on calendar designators, a missing `P`, or a non-positive
/// total.
pub fn parse_iso8601_duration(value: &str) -> Result<Duration> {
    let rest = value
        .strip_prefix('P')
        .or_else(|| value.strip_prefix('p'))
        .ok_or_else(|| anyhow!("'{value}' does not start with 'P'"))?;

    let mut seconds = 0.0_f64;
    let mut in_time = false;
    let mut number = String::new();
    for ch in rest.chars() {
        match ch {
            'T' | 't' if number.is_empty() => in_time = true,
            '0'..='9' => number.push(ch),
            '.' | ',' => number.push('.'),
            designator => {
                let amount: f64 = number
                    .parse()
                    .map_err(|_| anyhow!("'{value}' has no number before '{designator}'"))?;
                number.clear();
                let factor = match (designator.to_ascii_uppercase(), in_time) {
                    ('D', false) => 86_400.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => bail!("unsupported designator '{designator}' in '{value}'"),
                };
                seconds += amount * factor;
            }
        }
    }
    if !number.is_empty() {
        bail!("'{value}' ends with a number missing its designator");
    }
    if seconds <= 0.0 {
        bail!("'{value}' is not a positive duration");
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn parse_cache_size(value: &str) -> Result<NonZeroUsize> {
    let size: usize = value.parse()?;
    NonZeroUsize::new(size).ok_or_else(|| anyhow!("cache size must be non-zero"))
}

fn parse_baseline_policy(value: &str) -> Result<BaselinePolicy> {
    match value.to_ascii_lowercase().as_str() {
        "hold" => Ok(BaselinePolicy::Hold),
        "refresh" => Ok(BaselinePolicy::Refresh),
        other => bail!("unknown baseline policy '{other}', expected 'hold' or 'refresh'"),
    }
}

fn parse_qos(value: &str) -> Result<u8> {
    let qos: u8 = value.parse()?;
    if qos > 2 {
        bail!("QoS must be 0, 1 or 2, got {qos}");
    }
    Ok(qos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_only() {
        assert_eq!(parse_iso8601_duration("PT10S").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(parse_iso8601_duration("PT1M30S").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn days_and_hours() {
        assert_eq!(
            parse_iso8601_duration("P1DT2H").unwrap(),
            Duration::from_secs(93_600)
        );
    }

    #[test]
    fn fractional_seconds() {
        assert_eq!(
            parse_iso8601_duration("PT0.5S").unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            parse_iso8601_duration("PT2,5S").unwrap(),
            Duration::from_millis(2_500)
        );
    }

    #[test]
    fn rejects_plain_numbers() {
        assert!(parse_iso8601_duration("10").is_err());
        assert!(parse_iso8601_duration("10s").is_err());
    }

    #[test]
    fn rejects_calendar_designators() {
        // Without the time marker, M means months.
        assert!(parse_iso8601_duration("P1M").is_err());
        assert!(parse_iso8601_duration("P1Y").is_err());
    }

    #[test]
    fn rejects_empty_and_zero() {
        assert!(parse_iso8601_duration("P").is_err());
        assert!(parse_iso8601_duration("PT").is_err());
        assert!(parse_iso8601_duration("PT0S").is_err());
    }

    #[test]
    fn rejects_trailing_number() {
        assert!(parse_iso8601_duration("PT30").is_err());
    }

    #[test]
    fn qos_range() {
        assert_eq!(parse_qos("0").unwrap(), 0);
        assert_eq!(parse_qos("2").unwrap(), 2);
        assert!(parse_qos("3").is_err());
        assert!(parse_qos("one").is_err());
    }

    #[test]
    fn cache_size_must_be_nonzero() {
        assert_eq!(parse_cache_size("20000").unwrap().get(), 20_000);
        assert!(parse_cache_size("0").is_err());
    }

    #[test]
    fn baseline_policy_names() {
        assert_eq!(parse_baseline_policy("hold").unwrap(), BaselinePolicy::Hold);
        assert_eq!(
            parse_baseline_policy("Refresh").unwrap(),
            BaselinePolicy::Refresh
        );
        assert!(parse_baseline_policy("latest").is_err());
    }

    #[test]
    fn default_topic_scheme() {
        let config = BridgeConfig::default();
        let scheme = config.mqtt.topic_scheme();

        assert_eq!(scheme.prediction("1020453"), "transit/predictions/1020453");
    }
}
