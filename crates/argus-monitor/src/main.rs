//! Presence tracker binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use argus_monitor::{Monitor, MonitorConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("argus=info".parse().expect("valid directive")),
        )
        .init();

    info!("Starting argus-monitor");

    let config = MonitorConfig::from_env();
    info!(base_dir = %config.base_dir.display(), "Monitor config loaded");

    let monitor = match Monitor::new(config).await {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to build monitor: {e}");
            std::process::exit(1);
        }
    };

    monitor.start(None);

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    monitor.stop();
    info!("Monitor shutdown complete");
}
