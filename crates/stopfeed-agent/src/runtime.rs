//! Bridge runtime wiring.

use crate::config::{BridgeConfig, SourceConfig};
use crate::publisher::MqttPublisher;
use crate::scheduler::PollScheduler;
use anyhow::{Context, Result};
use rumqttc::{Event, EventLoop, Packet};
use std::time::Duration;
use stopfeed_adapter_pg::{PgSourceClient, PgSourceConfig};
use tokio::sync::watch;

/// The assembled bridge process.
pub struct Bridge {
    config: BridgeConfig,
}

impl Bridge {
    /// Wrap a loaded configuration.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Run until interrupted.
    ///
    /// Runtime faults (fetch errors, publish errors, broker disconnects) are
    /// logged and retried on later cycles; only startup wiring can fail.
    ///
    /// # Errors
    ///
    /// Returns error if the MQTT client or the source pools cannot be set
    /// up.
    pub async fn run(self) -> Result<()> {
        let scheme = self.config.mqtt.topic_scheme();

        let (publisher, eventloop) = MqttPublisher::connect(&self.config.mqtt)
            .context("Failed to set up the MQTT client")?;
        tokio::spawn(drive_mqtt(eventloop));

        let source = PgSourceClient::new(pg_config(&self.config.source))
            .context("Failed to set up the prediction database pools")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Could not listen for the shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        });

        let mut scheduler =
            PollScheduler::new(&self.config.pipeline, scheme, source, publisher);
        scheduler.run(shutdown_rx).await;

        tracing::info!("Bridge stopped");
        Ok(())
    }
}

fn pg_config(source: &SourceConfig) -> PgSourceConfig {
    let defaults = PgSourceConfig::default();
    PgSourceConfig {
        doi_url: source.doi_url.clone(),
        roi_url: source.roi_url.clone(),
        predictions_query: source
            .predictions_query
            .clone()
            .unwrap_or(defaults.predictions_query),
        events_query: source.events_query.clone().unwrap_or(defaults.events_query),
        max_connections: source.max_connections,
        acquire_timeout: defaults.acquire_timeout,
    }
}

/// Keep the MQTT event loop turning.
///
/// rumqttc reconnects on the next poll after an error; the sleep keeps a
/// dead broker from spinning this task.
async fn drive_mqtt(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(error) => {
                tracing::error!(%error, "MQTT connection error");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
