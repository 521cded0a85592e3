//! Bridge process entry point.

use anyhow::Result;
use stopfeed_agent::{Bridge, BridgeConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Stopfeed bridge"
    );

    let config = BridgeConfig::from_env()?;
    let bridge = Bridge::new(config);
    bridge.run().await?;

    Ok(())
}
