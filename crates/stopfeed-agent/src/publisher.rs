//! MQTT publishing.
//!
//! The publisher is a thin wrapper over the broker client: it resolves the
//! connection options from configuration and pushes one payload per call.
//! It never retries in-cycle — a failed publish is reported to the scheduler
//! and the record stays eligible for the next cycle's re-detection.
//! Reconnects are the event loop's business (see the runtime module).

use crate::config::MqttConfig;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS, TlsConfiguration, Transport};
use url::Url;
use uuid::Uuid;

/// Where per-stop messages go.
///
/// Abstracted so the scheduler can be driven against an in-process sink in
/// tests.
#[allow(async_fn_in_trait)]
pub trait PublishSink {
    /// Publish one payload to one topic.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the broker rejects or cannot accept the
    /// message. Failures are independent per call.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// MQTT-backed publish sink.
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
}

impl MqttPublisher {
    /// Build the MQTT client from configuration.
    ///
    /// TLS is enabled iff a CA bundle path is configured; credentials are
    /// used iff both username and password are set; the client id is
    /// generated randomly when unset. The returned event loop must be
    /// polled for the connection to make progress.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid broker URL, an unreadable CA bundle, or
    /// an out-of-range QoS.
    pub fn connect(config: &MqttConfig) -> Result<(Self, EventLoop), PublishError> {
        let (host, port) = parse_broker_url(&config.broker)?;
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("stopfeed-{}", Uuid::new_v4()));

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(config.keep_alive);

        if let Some(path) = &config.ca_path {
            let ca = std::fs::read(path)
                .map_err(|e| PublishError::Tls(format!("{}: {e}", path.display())))?;
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                options.set_credentials(username.clone(), password.clone());
            }
            (None, None) => {}
            _ => tracing::warn!(
                "Ignoring MQTT credentials: both username and password must be set"
            ),
        }

        let qos = qos_from_level(config.qos)?;
        let (client, eventloop) = AsyncClient::new(options, 100);
        Ok((Self { client, qos }, eventloop))
    }
}

impl PublishSink for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))
    }
}

/// Map a configured QoS level onto the protocol enum.
fn qos_from_level(level: u8) -> Result<QoS, PublishError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(PublishError::InvalidQos(other)),
    }
}

/// Parse a broker URL into host and port.
fn parse_broker_url(input: &str) -> Result<(String, u16), PublishError> {
    if input.contains("://") {
        let url = Url::parse(input)
            .map_err(|e| PublishError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" | "mqtts" | "ssl" => {}
            scheme => {
                return Err(PublishError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| PublishError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PublishError::InvalidBrokerUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port.parse().map_err(|_| {
            PublishError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
        })?,
    };
    if parts.next().is_some() {
        return Err(PublishError::InvalidBrokerUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for publish operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// TLS setup failed
    #[error("TLS setup error: {0}")]
    Tls(String),
    /// Configured QoS level is out of range
    #[error("QoS out of range: {0}")]
    InvalidQos(u8),
    /// Broker publish failed
    #[error("broker publish error: {0}")]
    Broker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_with_scheme() {
        assert_eq!(
            parse_broker_url("tcp://broker.example:8883").unwrap(),
            ("broker.example".to_string(), 8883)
        );
        assert_eq!(
            parse_broker_url("mqtt://broker.example").unwrap(),
            ("broker.example".to_string(), 1883)
        );
    }

    #[test]
    fn bare_host_and_port() {
        assert_eq!(
            parse_broker_url("localhost:1884").unwrap(),
            ("localhost".to_string(), 1884)
        );
        assert_eq!(
            parse_broker_url("localhost").unwrap(),
            ("localhost".to_string(), 1883)
        );
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(matches!(
            parse_broker_url("http://broker.example"),
            Err(PublishError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_broker_url("host:port:extra").is_err());
        assert!(parse_broker_url(":1883").is_err());
    }

    #[test]
    fn qos_levels_map_onto_protocol() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_level(3), Err(PublishError::InvalidQos(3))));
    }
}
